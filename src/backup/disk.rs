use std::fmt::Debug;
use std::io;
use std::path::Path;

pub trait DiskSpace: Debug {
    /// Bytes available to this process on the filesystem holding `dir`.
    fn free_space(&self, dir: &Path) -> io::Result<u64>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Fs2DiskSpace;

impl DiskSpace for Fs2DiskSpace {
    fn free_space(&self, dir: &Path) -> io::Result<u64> {
        fs2::available_space(dir)
    }
}
