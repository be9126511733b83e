//! Запуск внешних процессов с ограничением по времени
//!
//! Вывод процесса читается в отдельных потоках, чтобы заполненный pipe не
//! блокировал дочерний процесс. По истечении лимита процесс завершается.

use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{DubError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const PIPE_GRACE: Duration = Duration::from_millis(500);

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
    }
    rx
}

/// Выполняет `command` и собирает вывод; дольше `limit` процесс не живет.
///
/// Код завершения не проверяется, это делает вызывающая сторона. Превышение
/// лимита возвращается как `DubError::Timeout` для этапа `stage`.
pub fn output_with_timeout(command: &mut Command, stage: &str, limit: Duration) -> Result<Output> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let started_at = Instant::now();

    let stdout_rx = drain(child.stdout.take());
    let stderr_rx = drain(child.stderr.take());

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Output {
                status,
                stdout: stdout_rx.recv_timeout(PIPE_GRACE).unwrap_or_default(),
                stderr: stderr_rx.recv_timeout(PIPE_GRACE).unwrap_or_default(),
            });
        }

        if started_at.elapsed() >= limit {
            warn!("{} exceeded {:?}, killing process {}", stage, limit, child.id());
            if let Err(e) = child.kill().and_then(|_| child.wait()) {
                warn!("Failed to stop {} process {}: {}", stage, child.id(), e);
            }
            let stderr = stderr_rx.recv_timeout(PIPE_GRACE).unwrap_or_default();
            debug!("{} stderr before kill: {}", stage, String::from_utf8_lossy(&stderr).trim());
            return Err(DubError::Timeout {
                stage: stage.to_string(),
                secs: limit.as_secs(),
            });
        }

        thread::sleep(POLL_INTERVAL);
    }
}
