//! The external-collaborator plugins: imaging, OTA staging, bootloader
//! installation, and final property-file writing. Each is a concrete
//! `driver::Plugin`, not a placeholder - see `DESIGN.md`.

pub mod bootloader;
pub mod finalizer;
pub mod imager;
pub mod ota;
