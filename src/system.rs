use std::path::PathBuf;
use std::process::Command;

use anyhow::{Result, anyhow};
use log::debug;
use rustix::fs::stat;

use crate::constants;

pub trait CmdRunner: Send + Sync {
    fn run_command(&self, cmd: &str, args: &[&str]) -> Result<String>;
}

#[derive(Clone, Debug)]
pub struct HostCmdRunner {
    path_var: String,
}

impl HostCmdRunner {
    pub fn new() -> Self {
        Self {
            path_var: constants::ENV_PATH.into(),
        }
    }
}

impl Default for HostCmdRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CmdRunner for HostCmdRunner {
    fn run_command(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let command_line = command_line(cmd, args);
        let executable = find_executable_in_path(cmd, &self.path_var)
            .ok_or_else(|| anyhow!("unable to find {} in {}", cmd, self.path_var))?;
        debug!("Running {}", command_line);
        let output = Command::new(&executable)
            .args(args)
            .env("PATH", &self.path_var)
            .output()
            .map_err(|e| anyhow!("unable to run {:?}: {}", executable, e))?;
        match output.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            Some(code) => Err(anyhow!(
                "{} failed with exit code {}: {}",
                command_line,
                code,
                String::from_utf8_lossy(&output.stderr).trim()
            )),
            None => Err(anyhow!("{} terminated by signal", command_line)),
        }
    }
}

pub(crate) fn command_line(cmd: &str, args: &[&str]) -> String {
    let mut fields = vec![cmd];
    fields.extend_from_slice(args);
    fields.join(" ")
}

pub fn find_executable_in_path(executable: &str, path_var: &str) -> Option<PathBuf> {
    if executable.contains('/') {
        return Some(PathBuf::from(executable));
    }
    for dir in path_var.split(":").filter(|d| !d.is_empty()) {
        let try_path = PathBuf::from_iter([dir, executable]);
        if let Ok(st) = stat(&try_path)
            && st.st_mode & 0o111 != 0
        {
            return Some(try_path);
        }
    }
    None
}
