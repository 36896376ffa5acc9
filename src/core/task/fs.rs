//! 文件系统能力：基本文件操作加上两个由宿主环境提供的探测
//! （剩余空间是否不足、本地读写是否正常）

use log::{debug, warn};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use sysinfo::Disks;
use uuid::Uuid;

pub trait FileSystem: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// 文件长度，不存在时返回 None
    fn file_len(&self, path: &Path) -> Option<u64> {
        fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    /// 打开写入；`append` 为 false 时截断
    fn open_write(&self, path: &Path, append: bool) -> io::Result<Box<dyn Write + Send>> {
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        Ok(Box::new(file))
    }

    /// 所在磁盘剩余空间是否低于 `min_free` 字节
    fn is_storage_full(&self, dir: &Path, min_free: u64) -> bool;

    /// 在目录里写一个探测文件并读回，检查本地读写是否正常
    fn is_io_healthy(&self, dir: &Path) -> bool;
}

/// 本机文件系统
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFileSystem {
    fn is_storage_full(&self, dir: &Path, min_free: u64) -> bool {
        match available_space(dir) {
            Some(available) => {
                debug!("{} 剩余空间 {} 字节", dir.display(), available);
                available < min_free
            }
            None => false,
        }
    }

    fn is_io_healthy(&self, dir: &Path) -> bool {
        let probe = dir.join(format!(".probe-{}", Uuid::new_v4().simple()));
        let payload = b"taskmill-io-probe";
        let result = (|| -> io::Result<bool> {
            let mut file = fs::File::create(&probe)?;
            file.write_all(payload)?;
            file.sync_all()?;
            let mut read_back = Vec::new();
            fs::File::open(&probe)?.read_to_end(&mut read_back)?;
            Ok(read_back == payload)
        })();
        let _ = fs::remove_file(&probe);
        match result {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!("本地读写自检失败: {}", e);
                false
            }
        }
    }
}

/// 找挂载点最长匹配的磁盘
fn available_space(dir: &Path) -> Option<u64> {
    let dir = dir.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| dir.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

/// 带缓冲的写入器，满一个缓冲区才落盘
pub struct BufferedWriter {
    buffer: Vec<u8>,
    current_pos: usize,
    writer: Box<dyn Write + Send>,
    total_written: u64,
}

impl BufferedWriter {
    pub fn new(writer: Box<dyn Write + Send>, buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            buffer: vec![0; buffer_size],
            current_pos: 0,
            writer,
            total_written: 0,
        }
    }

    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut bytes_written = 0;
        while bytes_written < data.len() {
            let space_left = self.buffer.len() - self.current_pos;
            let to_copy = space_left.min(data.len() - bytes_written);
            self.buffer[self.current_pos..self.current_pos + to_copy]
                .copy_from_slice(&data[bytes_written..bytes_written + to_copy]);
            self.current_pos += to_copy;
            bytes_written += to_copy;

            if self.current_pos == self.buffer.len() {
                self.flush()?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        if self.current_pos > 0 {
            self.writer.write_all(&self.buffer[..self.current_pos])?;
            self.total_written += self.current_pos as u64;
            self.current_pos = 0;
        }
        self.writer.flush()
    }

    /// 已经落盘的字节数
    pub fn total_written(&self) -> u64 {
        self.total_written
    }
}
