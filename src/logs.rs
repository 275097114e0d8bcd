//! Background forwarding of the product's own logs.
use std::{
    io::{self, BufRead, BufReader, Read},
    process::{Command, Stdio},
    thread::{self, JoinHandle},
};

use nix::unistd::geteuid;
use tracing::{debug, info, warn};

use crate::{
    constants::JOURNAL_UNITS,
    host::{InitSystem, Invocation},
};

/// Shell line that streams the product's logs for the given init system.
/// Reading the journal or syslog needs privileges, so the line goes through
/// `sudo` unless `as_root` is set.
pub fn follower_line(init: InitSystem, as_root: bool) -> String {
    let line = match init {
        InitSystem::Systemd => {
            let units: Vec<String> = JOURNAL_UNITS.iter().map(|unit| format!("-u {unit}")).collect();
            format!("journalctl -f {}", units.join(" "))
        }
        InitSystem::SysV => "tail -f /var/log/syslog | grep scylla".to_string(),
    };
    Invocation::new(line).sudo().render(as_root)
}

pub fn follower_command(init: InitSystem, as_root: bool) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(follower_line(init, as_root));
    cmd
}

/// Forwards every line of `reader` to the `scylla` tracing target and
/// returns how many lines were seen.
pub fn forward_lines<R: Read>(reader: R) -> usize {
    let mut forwarded = 0;
    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        info!(target: "scylla", "{line}");
        forwarded += 1;
    }
    forwarded
}

/// Starts `command` and forwards its stdout from a detached thread.
///
/// The thread ends when the command closes its output. Nobody needs to join
/// it; the handle only reports the forwarded line count. A follower that
/// fails before producing any output is logged as a warning.
pub fn spawn_follower(mut command: Command) -> io::Result<JoinHandle<usize>> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("log follower has no stdout"))?;

    thread::Builder::new()
        .name("scylla-logs".into())
        .spawn(move || {
            let forwarded = forward_lines(stdout);
            match child.wait() {
                Ok(status) if forwarded == 0 && !status.success() => {
                    warn!("Log follower exited with {status} without forwarding any line")
                }
                Ok(_) => debug!("Log follower finished after {forwarded} line(s)"),
                Err(err) => warn!("Log follower could not be reaped: {err}"),
            }
            forwarded
        })
}

/// Follows the product logs for the rest of the process.
pub fn follow_product_logs(init: InitSystem) -> io::Result<JoinHandle<usize>> {
    spawn_follower(follower_command(init, geteuid().is_root()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn journal_follows_every_product_unit() {
        let line = follower_line(InitSystem::Systemd, true);
        assert!(line.starts_with("journalctl -f "));
        for unit in JOURNAL_UNITS {
            assert!(line.contains(&format!("-u {unit}")));
        }
    }

    #[test]
    fn unprivileged_runs_read_logs_through_sudo() {
        assert!(follower_line(InitSystem::Systemd, false).starts_with("sudo journalctl -f "));
        assert_eq!(
            follower_line(InitSystem::SysV, false),
            "sudo tail -f /var/log/syslog | grep scylla"
        );
    }

    #[test]
    fn sysv_hosts_tail_syslog() {
        let cmd = follower_command(InitSystem::SysV, true);
        assert_eq!(cmd.get_program(), "sh");
        let args: Vec<_> = cmd.get_args().map(|arg| arg.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["-c", "tail -f /var/log/syslog | grep scylla"]);
    }

    #[test]
    fn forwards_each_line() {
        let input = Cursor::new("scylla: starting\nscylla: ready\n");
        assert_eq!(forward_lines(input), 2);
    }

    #[test]
    fn follower_thread_ends_with_its_command() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf 'one\\ntwo\\nthree\\n'"]);
        let handle = spawn_follower(cmd).unwrap();
        assert_eq!(handle.join().unwrap(), 3);
    }

    #[test]
    fn failing_follower_still_finishes() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 1"]);
        let handle = spawn_follower(cmd).unwrap();
        assert_eq!(handle.join().unwrap(), 0);
    }
}
