//! In-process Scribe collector used by the integration tests.
//!
//! The collector speaks framed, non-strict Thrift binary and answers every
//! `Log` call with the next scripted result code, defaulting to `OK`.

#![allow(dead_code, reason = "each test binary uses a subset of the helpers")]

use std::{
    collections::VecDeque,
    io::Write,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use rstest::fixture;
use scribe_producer::{
    LogRecord,
    producer::codec::{ResultCode, decode_log_request, encode_log_response, read_frame},
};

const MAX_FRAME: usize = 1 << 20;

#[derive(Default)]
struct CollectorState {
    script: Mutex<VecDeque<ResultCode>>,
    accepted: Mutex<Vec<LogRecord>>,
    calls: AtomicUsize,
    connections: AtomicUsize,
    in_call: AtomicUsize,
    max_in_call: AtomicUsize,
    response_delay: Mutex<Duration>,
    stopping: AtomicBool,
}

/// Collector listening on an ephemeral loopback port.
pub struct MockCollector {
    addr: SocketAddr,
    state: Arc<CollectorState>,
    acceptor: Option<thread::JoinHandle<()>>,
}

impl MockCollector {
    pub fn start() -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind mock collector");
        let addr = listener.local_addr().expect("collector has address");
        let state = Arc::new(CollectorState::default());
        let acceptor_state = Arc::clone(&state);
        let acceptor = thread::spawn(move || accept_loop(&listener, &acceptor_state));
        Self {
            addr,
            state,
            acceptor: Some(acceptor),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Queue result codes for upcoming calls.
    pub fn script(&self, codes: impl IntoIterator<Item = ResultCode>) {
        self.state.script.lock().extend(codes);
    }

    pub fn set_response_delay(&self, delay: Duration) {
        *self.state.response_delay.lock() = delay;
    }

    /// Messages the collector answered with `OK`, in arrival order.
    pub fn accepted_messages(&self) -> Vec<String> {
        self.state
            .accepted
            .lock()
            .iter()
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn accepted(&self) -> Vec<LogRecord> {
        self.state.accepted.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Highest number of calls the collector was processing at once.
    pub fn max_concurrent_calls(&self) -> usize {
        self.state.max_in_call.load(Ordering::SeqCst)
    }
}

impl Drop for MockCollector {
    fn drop(&mut self) {
        self.state.stopping.store(true, Ordering::SeqCst);
        // Wake the blocking accept.
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.acceptor.take() {
            let _ = handle.join();
        }
    }
}

fn accept_loop(listener: &TcpListener, state: &Arc<CollectorState>) {
    for stream in listener.incoming() {
        if state.stopping.load(Ordering::SeqCst) {
            break;
        }
        let Ok(stream) = stream else {
            continue;
        };
        state.connections.fetch_add(1, Ordering::SeqCst);
        let state = Arc::clone(state);
        thread::spawn(move || serve_connection(stream, &state));
    }
}

fn serve_connection(mut stream: TcpStream, state: &CollectorState) {
    loop {
        // EOF marks the producer closing its connection after a cycle.
        let Ok(payload) = read_frame(&mut stream, MAX_FRAME) else {
            return;
        };
        let in_call = state.in_call.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_call.fetch_max(in_call, Ordering::SeqCst);
        state.calls.fetch_add(1, Ordering::SeqCst);

        let (seq, records) = decode_log_request(&payload).expect("decode Log call");
        let delay = *state.response_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let code = state.script.lock().pop_front().unwrap_or(ResultCode::Ok);
        if code == ResultCode::Ok {
            state.accepted.lock().extend(records);
        }
        let reply = encode_log_response(code, seq).expect("encode reply");
        state.in_call.fetch_sub(1, Ordering::SeqCst);
        if stream.write_all(&reply).is_err() {
            return;
        }
    }
}

#[fixture]
pub fn collector() -> MockCollector {
    MockCollector::start()
}

/// Port on which nothing is listening.
pub fn unused_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
    listener.local_addr().expect("listener has address").port()
}

#[fixture]
pub fn dead_port() -> u16 {
    unused_port()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
