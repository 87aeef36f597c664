//! Off-thread conversion for large inputs.
//!
//! Each request owns its buffer; workers share nothing but the queues.
//! Responses arrive in completion order and are matched by task id.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::detect::FileType;
use crate::error::{Error, ErrorKind, Result};
use crate::{Output, OutputFormat};

#[derive(Debug, Serialize)]
pub struct Request {
    pub task_id: Uuid,
    #[serde(skip)]
    pub buffer: Vec<u8>,
    pub file_type: Option<FileType>,
    pub format: OutputFormat,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<Error> for TaskError {
    fn from(e: Error) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub task_id: Uuid,
    pub result: std::result::Result<Output, TaskError>,
}

impl Response {
    pub fn into_result(self) -> Result<Output> {
        self.result.map_err(|e| Error::Offloaded {
            task_id: self.task_id,
            kind: e.kind,
            message: e.message,
        })
    }
}

fn run_worker(
    name: &str,
    requests: Receiver<Request>,
    responses: Sender<Response>,
    cancelled: Arc<AtomicBool>,
    config: Config,
) {
    while let Ok(req) = requests.recv() {
        if cancelled.load(Ordering::Acquire) {
            log::debug!("{name}: dropping task {} after termination", req.task_id);
            continue;
        }
        log::debug!("{name}: task {} ({} bytes)", req.task_id, req.buffer.len());
        let result = crate::convert_bytes_as(&req.buffer, req.file_type, req.format, &config)
            .map_err(TaskError::from);
        let response = Response {
            task_id: req.task_id,
            result,
        };
        if responses.send(response).is_err() {
            break;
        }
    }
    log::info!("{name} did shut down");
}

pub struct OffloadPool {
    requests: Option<Sender<Request>>,
    responses: Receiver<Response>,
    cancelled: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl OffloadPool {
    pub fn new(workers: usize, config: &Config) -> Result<Self> {
        let (req_tx, req_rx) = crossbeam_channel::unbounded::<Request>();
        let (resp_tx, resp_rx) = crossbeam_channel::unbounded::<Response>();
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(workers.max(1));
        for i in 0..workers.max(1) {
            let name = format!("docxview-worker-{i}");
            let requests = req_rx.clone();
            let responses = resp_tx.clone();
            let cancelled = cancelled.clone();
            let config = config.clone();
            let handle = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_worker(&name, requests, responses, cancelled, config))
                .map_err(|e| Error::Worker(format!("cannot spawn worker: {e}")))?;
            handles.push(handle);
        }

        Ok(Self {
            requests: Some(req_tx),
            responses: resp_rx,
            cancelled,
            workers: handles,
        })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Queues a conversion, moving `buffer` into the pool.
    pub fn submit(
        &self,
        buffer: Vec<u8>,
        file_type: Option<FileType>,
        format: OutputFormat,
    ) -> Result<Uuid> {
        let task_id = Uuid::new_v4();
        let sender = self
            .requests
            .as_ref()
            .ok_or_else(|| Error::Worker("pool is terminated".into()))?;
        sender
            .send(Request {
                task_id,
                buffer,
                file_type,
                format,
            })
            .map_err(|_| Error::Worker("all workers have exited".into()))?;
        Ok(task_id)
    }

    pub fn recv(&self) -> Result<Response> {
        self.responses
            .recv()
            .map_err(|_| Error::Worker("all workers have exited".into()))
    }

    /// Stops the pool. Queued tasks are discarded and the task a worker is
    /// already running is abandoned once it finishes.
    pub fn terminate(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        self.requests.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::warn!("worker thread panicked");
            }
        }
    }
}

impl Drop for OffloadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
