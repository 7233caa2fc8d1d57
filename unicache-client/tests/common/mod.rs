#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use unicache_client::ClientConfig;

/// Scripted RESP server on an ephemeral port.
///
/// Every command received is recorded, then handed to the handler, which
/// writes the reply. Connections are served one after another.
pub struct MockServer {
    pub addr: String,
    log: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: FnMut(&[String], &mut TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        Self::serve(listener, handler)
    }

    pub fn serve<F>(listener: TcpListener, mut handler: F) -> Self
    where
        F: FnMut(&[String], &mut TcpStream) + Send + 'static,
    {
        let addr = listener.local_addr().expect("addr").to_string();
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
                let mut reader = BufReader::new(stream.try_clone().expect("clone"));
                while let Ok(args) = read_command(&mut reader) {
                    let args: Vec<String> = args
                        .iter()
                        .map(|arg| String::from_utf8_lossy(arg).into_owned())
                        .collect();
                    seen.lock().expect("log").push(args.clone());
                    handler(&args, &mut stream);
                }
            }
        });

        MockServer { addr, log }
    }

    /// Commands received so far, each as its argument list.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.log.lock().expect("log").clone()
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands().into_iter().map(|args| args[0].clone()).collect()
    }

    pub fn port(&self) -> u16 {
        self.addr.rsplit(':').next().and_then(|p| p.parse().ok()).expect("port")
    }
}

/// Listener bound to an ephemeral port, for servers that must know their
/// own port before they start answering.
pub fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    (listener, port)
}

pub fn config_for(addr: &str) -> ClientConfig {
    ClientConfig {
        addr: addr.to_string(),
        max_idle: 1,
        max_total: 1,
        read_timeout: Some(Duration::from_secs(1)),
        write_timeout: Some(Duration::from_secs(1)),
        connect_timeout: Some(Duration::from_secs(1)),
        ..ClientConfig::default()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn read_command(reader: &mut BufReader<TcpStream>) -> std::io::Result<Vec<Vec<u8>>> {
    let mut line = Vec::new();
    read_line(reader, &mut line)?;
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array"));
    }
    let count = parse_usize(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        read_line(reader, &mut line)?;
        if line.first() != Some(&b'$') {
            return Err(invalid("expected bulk"));
        }
        let len = parse_usize(&line[1..])?;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if crlf != [b'\r', b'\n'] {
            return Err(invalid("missing crlf"));
        }
        args.push(data);
    }
    Ok(args)
}

fn read_line(reader: &mut BufReader<TcpStream>, buf: &mut Vec<u8>) -> std::io::Result<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(invalid("invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| invalid("length"))
}

fn invalid(message: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

pub fn write_simple(stream: &mut TcpStream, msg: &str) {
    let _ = stream.write_all(format!("+{msg}\r\n").as_bytes());
    let _ = stream.flush();
}

pub fn write_error(stream: &mut TcpStream, msg: &str) {
    let _ = stream.write_all(format!("-{msg}\r\n").as_bytes());
    let _ = stream.flush();
}

pub fn write_integer(stream: &mut TcpStream, value: i64) {
    let _ = stream.write_all(format!(":{value}\r\n").as_bytes());
    let _ = stream.flush();
}

pub fn write_bulk(stream: &mut TcpStream, data: &str) {
    let _ = stream.write_all(bulk(data).as_bytes());
    let _ = stream.flush();
}

pub fn write_nil(stream: &mut TcpStream) {
    let _ = stream.write_all(b"$-1\r\n");
    let _ = stream.flush();
}

/// Array of bulks; `None` entries are nil.
pub fn write_array(stream: &mut TcpStream, items: &[Option<&str>]) {
    let mut out = format!("*{}\r\n", items.len());
    for item in items {
        match item {
            Some(data) => out.push_str(&bulk(data)),
            None => out.push_str("$-1\r\n"),
        }
    }
    let _ = stream.write_all(out.as_bytes());
    let _ = stream.flush();
}

/// `CLUSTER SLOTS` reply mapping each `(start, end)` range to a local port.
pub fn write_slots(stream: &mut TcpStream, ranges: &[(u16, u16, u16)]) {
    let mut out = format!("*{}\r\n", ranges.len());
    for (start, end, port) in ranges {
        out.push_str(&format!("*3\r\n:{start}\r\n:{end}\r\n*2\r\n"));
        out.push_str(&bulk("127.0.0.1"));
        out.push_str(&format!(":{port}\r\n"));
    }
    let _ = stream.write_all(out.as_bytes());
    let _ = stream.flush();
}

fn bulk(data: &str) -> String {
    format!("${}\r\n{data}\r\n", data.len())
}
