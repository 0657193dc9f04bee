use crate::executor::{BlockingHandle, ThreadPool};
use crate::runtime::runtime::ThreadNameFn;
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::process::{Command, Output, Stdio};
use std::thread;

/// Runs external programs as jobs, at most `size` of them at a time.
///
/// A job is a [`Command`] fed a JSON document on stdin. It must exit
/// successfully and print a single JSON document on stdout, which becomes the
/// result. Anything else completes the handle with [`Error::ExecutorFailed`].
///
/// # Examples
///
/// ```no_run
/// use rondo::executor::ProcessPool;
/// use std::process::Command;
///
/// # #[rondo::main]
/// # async fn main() -> anyhow::Result<()> {
/// let pool = ProcessPool::new(2)?;
///
/// let echoed: Vec<u32> = pool.submit(Command::new("cat"), &vec![1, 2, 3]).await?;
/// assert_eq!(echoed, vec![1, 2, 3]);
/// # Ok(())
/// # }
/// ```
pub struct ProcessPool {
    pool: ThreadPool,
}

impl ProcessPool {
    pub fn new(size: usize) -> anyhow::Result<ProcessPool> {
        let pool = ThreadPool::with_config(size, &ThreadNameFn::numbered("rondo-process"), None)?;
        Ok(ProcessPool { pool })
    }

    pub fn size(&self) -> usize {
        self.pool.size()
    }

    /// Spawns `command` once a slot frees up, writes `input` to its stdin and
    /// parses its stdout as `O`.
    ///
    /// The input is serialized before this returns, so a value that cannot be
    /// encoded fails the handle without spawning anything.
    pub fn submit<I, O>(&self, command: Command, input: &I) -> BlockingHandle<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned + Send + 'static,
    {
        let payload = match serde_json::to_vec(input) {
            Ok(payload) => payload,
            Err(err) => {
                return BlockingHandle::failed(Error::executor(format!(
                    "failed to encode job input: {err}"
                )));
            }
        };

        self.pool.submit_fallible(move || run_job(command, payload))
    }
}

fn run_job<O: DeserializeOwned>(mut command: Command, payload: Vec<u8>) -> Result<O> {
    let program = command.get_program().to_string_lossy().into_owned();

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| Error::executor(format!("failed to spawn {program}: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::executor("child stdin is not piped"))?;

    // Feed stdin from another thread, a child that fills its stdout pipe
    // before reading everything would block us otherwise.
    let (written, output) = thread::scope(|scope| {
        let writer = scope.spawn(move || {
            let mut stdin = stdin;
            stdin.write_all(&payload)
        });

        let output = child.wait_with_output();
        (writer.join(), output)
    });

    let output = output.map_err(|err| Error::executor(format!("failed to wait on {program}: {err}")))?;
    check_status(&program, &output)?;

    match written {
        Ok(Ok(())) => {}
        // The program is free to ignore its input.
        Ok(Err(err)) if err.kind() == ErrorKind::BrokenPipe => {}
        Ok(Err(err)) => {
            return Err(Error::executor(format!("failed to write input to {program}: {err}")));
        }
        Err(payload) => return Err(Error::executor(Error::panic_message(&*payload))),
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|err| Error::executor(format!("invalid output from {program}: {err}")))
}

fn check_status(program: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();

    if stderr.is_empty() {
        Err(Error::executor(format!("{program} failed with {}", output.status)))
    } else {
        Err(Error::executor(format!(
            "{program} failed with {}: {stderr}",
            output.status
        )))
    }
}

impl fmt::Debug for ProcessPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessPool")
            .field("size", &self.size())
            .finish()
    }
}
