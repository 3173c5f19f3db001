use std::{
    fs::{self, File, create_dir, rename},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use log::debug;
use rustix::fs::{Dir, Mode, chmod, symlink};

pub trait FileSystem: Send + Sync {
    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    fn exists(&self, path: &Path) -> bool;

    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    fn read_link(&self, path: &Path) -> Result<PathBuf>;

    fn symlink(&self, target: &Path, path: &Path) -> Result<()>;

    fn read_file_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes).map_err(|e| anyhow!("unable to decode {:?}: {}", path, e))
    }

    /// Write `contents` unless the file already holds exactly those bytes.
    /// Returns whether the file changed.
    fn converge_file_contents(&self, path: &Path, contents: &[u8]) -> Result<bool> {
        if let Ok(existing) = self.read_file(path)
            && existing == contents
        {
            return Ok(false);
        }
        self.write_file(path, contents)?;
        Ok(true)
    }

    fn converge_symlink(&self, target: &Path, path: &Path) -> Result<bool> {
        if let Ok(existing) = self.read_link(path)
            && existing == target
        {
            return Ok(false);
        }
        self.symlink(target, path)?;
        Ok(true)
    }
}

#[derive(Clone, Debug, Default)]
pub struct HostFileSystem;

impl FileSystem for HostFileSystem {
    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let dir_fd = File::open(dir).map_err(|e| anyhow!("unable to open {:?}: {}", dir, e))?;
        let entries = Dir::read_from(dir_fd)
            .map_err(|e| anyhow!("unable to read from directory {:?}: {}", dir, e))?;
        let mut paths = Vec::new();
        for entry_res in entries {
            let entry = entry_res
                .map_err(|e| anyhow!("unable to read directory entry in {:?}: {}", dir, e))?;
            let name = entry.file_name().to_string_lossy();
            if name == "." || name == ".." {
                continue;
            }
            paths.push(dir.join(name.as_ref()));
        }
        paths.sort();
        Ok(paths)
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| anyhow!("unable to read {:?}: {}", path, e))
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            mkdir_p(parent, Mode::from(0o755))?;
        }
        atomic_write(path, contents)
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        fs::read_link(path).map_err(|e| anyhow!("unable to read link {:?}: {}", path, e))
    }

    fn symlink(&self, target: &Path, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                return Err(anyhow!("unable to remove {:?}: {}", path, e));
            }
            _ => (),
        }
        debug!("Linking {:?} to {:?}", path, target);
        symlink(target, path)
            .map_err(|e| anyhow!("unable to link {:?} to {:?}: {}", path, target, e))
    }
}

pub fn mkdir_p<P: AsRef<Path>>(path: P, mode: Mode) -> Result<()> {
    let path_str = path.as_ref().to_string_lossy();
    for dir in descending_dirs(&path_str) {
        match create_dir(&dir) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => (),
            Err(e) => return Err(anyhow!("unable to create directory {}: {}", dir, e)),
            Ok(_) => {
                debug!("Created directory: {}", &dir);
                chmod(&dir, mode)
                    .map_err(|e| anyhow!("unable to change mode of {}: {}", dir, e))?;
            }
        }
    }
    Ok(())
}

// Given a path, return a list of it and its parents in descending order.
// For example, "/a/b/c", returns the Vector ["/a", "/a/b", "/a/b/c"].
fn descending_dirs(path: &str) -> Vec<String> {
    let dirs = path.split("/").collect::<Vec<&str>>();
    (1..=dirs.len())
        .map(|i| dirs[..i].join("/"))
        .filter(|s| !s.is_empty())
        .collect()
}

// Write to a temporary file next to the target, then rename it into place so
// the network service never reads a partial file.
pub fn atomic_write<P: AsRef<Path>>(path: P, contents: &[u8]) -> Result<()> {
    let p = path.as_ref();
    let p_str = p.to_string_lossy();

    let dir_name = match p.parent() {
        Some(d) if d.as_os_str().is_empty() => Path::new("."),
        Some(d) => d,
        None => return Err(anyhow!("invalid path {}", p_str)),
    };
    let file_name = p
        .file_name()
        .ok_or_else(|| anyhow!("invalid path {}", p_str))?;
    let file_name_tmp = dir_name.join(format!(".{}.tmp", file_name.to_string_lossy()));

    fs::write(&file_name_tmp, contents).context(format!("unable to write {}", p_str))?;
    File::open(&file_name_tmp)
        .and_then(|f| f.sync_all())
        .context(format!("unable to sync {}", p_str))?;

    rename(&file_name_tmp, p).context(format!(
        "unable to rename {} to {}",
        file_name_tmp.to_string_lossy(),
        p_str
    ))?;
    let dir_name_str = dir_name.to_string_lossy();
    let dir = File::open(dir_name).context(format!("unable to open directory {}", dir_name_str))?;
    dir.sync_all()
        .context(format!("unable to sync directory {}", dir_name_str))
}
