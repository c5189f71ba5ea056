#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use smtpd::{ServerConfig, SmtpServer, Storage};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

pub const HOSTNAME: &str = "mx.accepted.test";

/// Minimal line-oriented SMTP client.
pub struct Client<S> {
    stream: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Read one complete reply, returning every line without CRLF.
    pub async fn read_reply(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = tokio::time::timeout(Duration::from_secs(10), self.stream.read_line(&mut line))
                .await
                .expect("reply timed out")
                .expect("read failed");
            assert!(n > 0, "connection closed while waiting for a reply");
            let line = line.trim_end().to_string();
            let last = line.as_bytes().get(3) != Some(&b'-');
            lines.push(line);
            if last {
                return lines;
            }
        }
    }

    /// Last line of the next reply.
    pub async fn reply(&mut self) -> String {
        self.read_reply().await.pop().unwrap()
    }

    pub async fn send_line(&mut self, line: &str) {
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.write_all(b"\r\n").await.unwrap();
        stream.flush().await.unwrap();
    }

    pub async fn command(&mut self, line: &str) -> String {
        self.send_line(line).await;
        self.reply().await
    }

    /// True once the server has closed the connection. Anything still in
    /// flight is discarded.
    pub async fn is_closed(&mut self) -> bool {
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(10), self.stream.read_to_end(&mut rest))
            .await
            .is_ok()
    }

    /// Bytes received but not yet returned as reply lines.
    pub fn pending(&self) -> usize {
        self.stream.buffer().len()
    }

    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig::new("127.0.0.1:0", HOSTNAME).with_domains(["accepted.test", "example.com"])
}

/// Serve `config` on an ephemeral port in the background.
pub async fn start_server(config: ServerConfig, storage: Arc<dyn Storage>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = SmtpServer::new(config, storage);
    tokio::spawn(async move { server.serve(listener).await });
    addr
}

/// Connect and consume the banner.
pub async fn connect(addr: SocketAddr) -> (Client<TcpStream>, String) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut client = Client::new(stream);
    let banner = client.reply().await;
    (client, banner)
}

/// Write a self-signed `localhost` certificate and key into `dir`.
pub fn write_self_signed(dir: &Path) -> (PathBuf, PathBuf) {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    std::fs::write(&cert_path, cert.serialize_pem().unwrap()).unwrap();
    std::fs::write(&key_path, cert.serialize_private_key_pem()).unwrap();
    (cert_path, key_path)
}

pub fn connector_trusting(cert_path: &Path) -> TlsConnector {
    let pem = std::fs::read(cert_path).unwrap();
    let mut roots = rustls::RootCertStore::empty();
    for der in rustls_pemfile::certs(&mut pem.as_slice()).unwrap() {
        roots.add(&rustls::Certificate(der)).unwrap();
    }
    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Perform the client side of the handshake after a `220` to STARTTLS.
pub async fn upgrade(
    client: Client<TcpStream>,
    connector: &TlsConnector,
) -> Client<TlsStream<TcpStream>> {
    let name = rustls::ServerName::try_from("localhost").unwrap();
    let stream = connector.connect(name, client.into_inner()).await.unwrap();
    Client::new(stream)
}
