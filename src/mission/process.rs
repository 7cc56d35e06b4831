//! Launching and signalling the mission process.
//!
//! The launch script runs as `bash <script>` in its own process group so that
//! everything it starts can be terminated together. Stdout and stderr share a
//! single pipe, so lines are read back in the order the script wrote them.

use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

const OUTPUT_CHANNEL_SIZE: usize = 256;

/// Signals the supervisor sends to a mission's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
}

impl Signal {
    fn as_raw(self) -> libc::c_int {
        match self {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }
}

/// A running launch script.
pub struct MissionProcess {
    pub child: Child,
    /// Pid of the script, also its process group id
    pub pid: u32,
    /// Merged stdout/stderr lines; closes once every writer has exited
    pub output: mpsc::Receiver<io::Result<String>>,
}

/// Set mode 0755 on the launch script.
pub async fn make_executable(script: &Path) -> io::Result<()> {
    tokio::fs::set_permissions(script, std::fs::Permissions::from_mode(0o755)).await
}

/// Start `bash <script>` in `cwd` and begin forwarding its output.
pub fn spawn(script: &Path, cwd: &Path) -> io::Result<MissionProcess> {
    let (reader, writer) = io::pipe()?;
    let stderr_writer = writer.try_clone()?;

    let mut command = Command::new("bash");
    command
        .arg(script)
        .current_dir(cwd)
        .env("PYTHONUNBUFFERED", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::from(writer))
        .stderr(Stdio::from(stderr_writer))
        .process_group(0)
        .kill_on_drop(true);
    let child = command.spawn()?;
    // The command owns the parent's copies of the write end; EOF needs them gone.
    drop(command);

    let pid = child.id().ok_or_else(|| {
        io::Error::new(io::ErrorKind::Other, "mission process exited before start")
    })?;

    let receiver = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
    let (tx, output) = mpsc::channel(OUTPUT_CHANNEL_SIZE);
    tokio::spawn(forward_lines(receiver, tx));

    Ok(MissionProcess { child, pid, output })
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<io::Result<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(Ok(line)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}

/// Send `signal` to the whole process group led by `pid`.
///
/// A group that no longer exists counts as success.
pub fn signal_group(pid: u32, signal: Signal) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    let rc = unsafe { libc::kill(-pgid, signal.as_raw()) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

/// Exit code as a shell reports it; death by signal N becomes `-N`.
pub fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code().or_else(|| status.signal().map(|sig| -sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(mut process: MissionProcess) -> (Vec<String>, ExitStatus) {
        let mut lines = Vec::new();
        while let Some(line) = process.output.recv().await {
            lines.push(line.expect("read line").trim_end().to_string());
        }
        let status = process.child.wait().await.expect("wait");
        (lines, status)
    }

    #[tokio::test]
    async fn merges_stdout_and_stderr() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("launch.sh");
        tokio::fs::write(&script, "echo out\necho err >&2\necho \"$PYTHONUNBUFFERED\"\nexit 4\n")
            .await
            .unwrap();

        let process = spawn(&script, dir.path()).expect("spawn");
        let (lines, status) = collect(process).await;
        assert_eq!(lines, vec!["out", "err", "1"]);
        assert_eq!(exit_code(status), Some(4));
    }

    #[tokio::test]
    async fn interleaved_streams_keep_write_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("launch.sh");
        tokio::fs::write(
            &script,
            "for i in $(seq 1 300); do echo o$i; echo e$i >&2; done\n",
        )
        .await
        .unwrap();

        let process = spawn(&script, dir.path()).expect("spawn");
        let (lines, status) = collect(process).await;
        let expected: Vec<String> = (1..=300)
            .flat_map(|i| [format!("o{}", i), format!("e{}", i)])
            .collect();
        assert_eq!(lines, expected);
        assert_eq!(exit_code(status), Some(0));
    }

    #[tokio::test]
    async fn runs_in_the_given_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("launch.sh");
        tokio::fs::write(&script, "pwd\n").await.unwrap();

        let process = spawn(&script, dir.path()).expect("spawn");
        let (lines, _) = collect(process).await;
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(std::fs::canonicalize(&lines[0]).unwrap(), expected);
    }

    #[tokio::test]
    async fn terminate_reaches_the_group() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("launch.sh");
        tokio::fs::write(&script, "sleep 30\n").await.unwrap();

        let mut process = spawn(&script, dir.path()).expect("spawn");
        signal_group(process.pid, Signal::Terminate).expect("signal");
        let status = tokio::time::timeout(std::time::Duration::from_secs(5), process.child.wait())
            .await
            .expect("process exits after SIGTERM")
            .expect("wait");
        assert_eq!(exit_code(status), Some(-libc::SIGTERM));

        // Group is gone now; signalling again is not an error.
        signal_group(process.pid, Signal::Kill).expect("missing group is ok");
    }

    #[tokio::test]
    async fn make_executable_sets_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("launch.sh");
        tokio::fs::write(&script, "true\n").await.unwrap();
        make_executable(&script).await.expect("chmod");
        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
