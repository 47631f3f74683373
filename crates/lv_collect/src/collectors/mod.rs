//! Built-in collectors

pub mod libvirt;
