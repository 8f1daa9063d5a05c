//! Scripted inner service shared by the stage tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tower::Service;

use crate::{Error, Request, Response, Result};

/// One scripted outcome.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Reply {
    /// Respond with this status; non-2xx becomes `Error::Http`.
    Status(u16),
    /// Fail without a response.
    Refused,
    /// Fail with an error that is neither an HTTP nor a connectivity failure.
    Invalid,
}

/// Replies with scripted outcomes, repeating the last one, and records every call.
#[derive(Clone)]
pub(crate) struct MockService {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    last: Arc<Mutex<Reply>>,
    call_count: Arc<AtomicU32>,
    calls: Arc<Mutex<Vec<(Instant, Request)>>>,
    delay: Option<Duration>,
}

impl MockService {
    pub(crate) fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        let replies: VecDeque<_> = replies.into_iter().collect();
        let last = replies.back().copied().unwrap_or(Reply::Status(200));
        Self {
            replies: Arc::new(Mutex::new(replies)),
            last: Arc::new(Mutex::new(last)),
            call_count: Arc::new(AtomicU32::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    pub(crate) fn status(status: u16) -> Self {
        Self::new([Reply::Status(status)])
    }

    pub(crate) fn statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self::new(statuses.into_iter().map(Reply::Status))
    }

    pub(crate) fn refused() -> Self {
        Self::new([Reply::Refused])
    }

    /// Each call waits this long before replying.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        let calls = self.calls.lock().expect("calls");
        calls.iter().map(|(_, request)| request.clone()).collect()
    }

    pub(crate) fn call_times(&self) -> Vec<Instant> {
        let calls = self.calls.lock().expect("calls");
        calls.iter().map(|(at, _)| *at).collect()
    }

    fn next_reply(&self) -> Reply {
        let mut replies = self.replies.lock().expect("replies");
        match replies.pop_front() {
            Some(reply) => {
                *self.last.lock().expect("last") = reply;
                reply
            }
            None => *self.last.lock().expect("last"),
        }
    }
}

impl Service<Request> for MockService {
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls
            .lock()
            .expect("calls")
            .push((Instant::now(), request.clone()));
        let reply = self.next_reply();
        let delay = self.delay;

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match reply {
                Reply::Refused => Err(Error::connection("connection refused")),
                Reply::Invalid => Err(Error::invalid_request("malformed header")),
                Reply::Status(status) => {
                    let body = Bytes::from(format!("call {count}"));
                    let response = Response::new(status, HashMap::new(), body).with_request(request);
                    if response.is_success() {
                        Ok(response)
                    } else {
                        Err(Error::from_response(response))
                    }
                }
            }
        })
    }
}

pub(crate) fn get(path: &str) -> Request {
    Request::builder(crate::Method::Get, path)
        .base_address("https://api.test")
        .build()
}
