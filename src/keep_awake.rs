// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 防休眠辅助进程 (例如 macOS 上的 `caffeinate -i`)
//!
//! 启动时创建, guard 析构时结束进程.

use std::process::{Child, Command, Stdio};

use tracing::{info, warn};

pub struct KeepAwake {
    command: String,
    child: Child,
}

impl KeepAwake {
    /// 启动辅助进程, 命令按空白拆分为程序与参数; 启动失败只记录日志
    pub fn spawn(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next()?;

        match Command::new(program)
            .args(parts)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                info!("☕ 防休眠进程已启动: {} (pid {})", command, child.id());
                Some(Self {
                    command: command.to_string(),
                    child,
                })
            }
            Err(e) => {
                warn!("⚠️ 防休眠进程启动失败 {}: {}", command, e);
                None
            }
        }
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for KeepAwake {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            // 进程已自行退出
            warn!("⚠️ 结束防休眠进程失败 {}: {}", self.command, e);
        }
        let _ = self.child.wait();
        info!("☕ 防休眠进程已结束: {}", self.command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command() {
        assert!(KeepAwake::spawn("").is_none());
        assert!(KeepAwake::spawn("   ").is_none());
    }

    #[test]
    fn test_missing_program() {
        assert!(KeepAwake::spawn("definitely-not-a-real-program-xyz --flag").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_drop_terminates_helper() {
        let guard = KeepAwake::spawn("sleep 30").unwrap();
        let pid = guard.id();
        assert!(pid > 0);
        drop(guard);
        // 被 wait 回收后 /proc 中不再存在
        #[cfg(target_os = "linux")]
        assert!(!std::path::Path::new(&format!("/proc/{}", pid)).exists());
    }
}
