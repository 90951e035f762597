use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const BUFFER_SIZE: usize = 8192;

enum Transfer {
    ClientToOrigin(std::io::Result<usize>),
    OriginToClient(std::io::Result<usize>),
}

/// Opaque bidirectional relay between the client and the origin.
///
/// Neither side's bytes are interpreted. The loop exits on EOF or a
/// write failure on either side, or when no data moves in either
/// direction for `idle_timeout`. Both streams are closed by drop at the
/// caller.
pub async fn relay(client: &mut TcpStream, origin: &mut TcpStream, idle_timeout: Duration) {
    let (mut client_read, mut client_write) = client.split();
    let (mut origin_read, mut origin_write) = origin.split();

    let mut client_buf = vec![0u8; BUFFER_SIZE];
    let mut origin_buf = vec![0u8; BUFFER_SIZE];

    loop {
        let transfer = timeout(idle_timeout, async {
            tokio::select! {
                result = client_read.read(&mut client_buf) => Transfer::ClientToOrigin(result),
                result = origin_read.read(&mut origin_buf) => Transfer::OriginToClient(result),
            }
        })
        .await;

        match transfer {
            Err(_) => {
                debug!("Tunnel idle for {:?}, closing", idle_timeout);
                break;
            }
            Ok(Transfer::ClientToOrigin(Ok(0))) | Ok(Transfer::OriginToClient(Ok(0))) => break,
            Ok(Transfer::ClientToOrigin(Ok(n))) => {
                if origin_write.write_all(&client_buf[..n]).await.is_err() {
                    break;
                }
            }
            Ok(Transfer::OriginToClient(Ok(n))) => {
                if client_write.write_all(&origin_buf[..n]).await.is_err() {
                    break;
                }
            }
            Ok(Transfer::ClientToOrigin(Err(_))) | Ok(Transfer::OriginToClient(Err(_))) => break,
        }
    }
}
