//! A minimal echo server: every frame read from a client is written back
//! verbatim. Run with `cargo run --example echo` and connect with any
//! WebSocket client against `ws://127.0.0.1:8080`.

use std::io::{Read, Write};
use std::net::TcpListener;

use wsrt_core::{Connection, ConnectionCallbacks, Server};

struct Echo;

impl ConnectionCallbacks for Echo {
    fn on_connect(&self, conn: &Connection) {
        tracing::info!(conn_id = conn.id(), peer = %conn.peer_addr(), "connected");
    }

    fn on_read(&self, conn: &Connection) -> std::io::Result<()> {
        let mut buf = [0u8; 4096];
        let n = conn.read(&mut buf)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peer closed",
            ));
        }
        conn.write_all(&buf[..n])
    }

    fn on_close(&self, conn: &Connection) {
        tracing::info!(conn_id = conn.id(), "closed");
    }
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind("127.0.0.1:8080")?;
    let server = Server::new(listener, Echo).expect("failed to build server");
    server.run().expect("server exited");
    Ok(())
}
