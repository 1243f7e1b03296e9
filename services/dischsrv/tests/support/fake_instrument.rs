//! Fake SCPI electronic load
//!
//! Listens on an ephemeral local port and answers the command subset the
//! service uses. Voltage falls by a fixed amount per voltage reading while
//! the input is enabled.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::IDN;

#[derive(Debug)]
struct LoadState {
    received: Vec<String>,
    voltage: f64,
    drop_per_read: f64,
    current: f64,
    enabled: bool,
    function: String,
    voltage_reads: usize,
    /// Close the connection once this many voltage reads were answered
    close_after_reads: Option<usize>,
    connections: usize,
}

pub struct FakeInstrument {
    addr: SocketAddr,
    state: Arc<Mutex<LoadState>>,
    handle: JoinHandle<()>,
}

impl FakeInstrument {
    pub async fn start(voltage: f64, drop_per_read: f64) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake instrument");
        let addr = listener.local_addr().expect("No local address");
        let state = Arc::new(Mutex::new(LoadState {
            received: Vec::new(),
            voltage,
            drop_per_read,
            current: 10.0,
            enabled: false,
            function: "CC".to_string(),
            voltage_reads: 0,
            close_after_reads: None,
            connections: 0,
        }));

        let shared = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                shared.lock().connections += 1;
                tokio::spawn(serve(socket, shared.clone()));
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn received(&self) -> Vec<String> {
        self.state.lock().received.clone()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }

    pub fn enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Drop the current connection after `reads` more voltage readings
    pub fn close_after_reads(&self, reads: usize) {
        let mut state = self.state.lock();
        state.close_after_reads = Some(state.voltage_reads + reads);
    }
}

impl Drop for FakeInstrument {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

enum Reply {
    Line(String),
    Silent,
    Hangup,
}

fn respond(state: &mut LoadState, line: &str) -> Reply {
    state.received.push(line.to_string());

    if let Some(rest) = line.strip_prefix("INPut:STATe ") {
        state.enabled = rest.trim() == "1";
        return Reply::Silent;
    }
    if let Some(rest) = line.strip_prefix("INPut:FUNCtion ") {
        state.function = rest.trim().to_string();
        return Reply::Silent;
    }

    match line {
        "*IDN?" => Reply::Line(IDN.to_string()),
        "INPut:STATe?" => Reply::Line(if state.enabled { "1" } else { "0" }.to_string()),
        "INPut:FUNCtion?" => Reply::Line(state.function.clone()),
        "MEASure:VOLTage?" => {
            if state.close_after_reads == Some(state.voltage_reads) {
                state.close_after_reads = None;
                return Reply::Hangup;
            }
            state.voltage_reads += 1;
            let reply = format!("{:.2}V", state.voltage);
            if state.enabled {
                state.voltage -= state.drop_per_read;
            }
            Reply::Line(reply)
        },
        "MEASure:CURRent?" => {
            let current = if state.enabled { state.current } else { 0.0 };
            Reply::Line(format!("{current:.3}A"))
        },
        "MEASure:POWer?" => {
            let current = if state.enabled { state.current } else { 0.0 };
            Reply::Line(format!("{:.1}W", state.voltage * current))
        },
        _ if line.ends_with('?') => Reply::Line("0".to_string()),
        _ => Reply::Silent,
    }
}

async fn serve(socket: TcpStream, state: Arc<Mutex<LoadState>>) {
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let reply = respond(&mut state.lock(), line.trim());
        match reply {
            Reply::Line(text) => {
                if write.write_all(format!("{text}\n").as_bytes()).await.is_err() {
                    return;
                }
            },
            Reply::Silent => {},
            Reply::Hangup => return,
        }
    }
}
