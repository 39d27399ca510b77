use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::rustls::pki_types::ServerName;

use crate::Error;
use crate::frame::{Frame, FromFrame};
use crate::stream::MaybeTlsStream;

#[derive(Debug)]
pub struct Connection {
    stream: MaybeTlsStream,
    timeout: Duration,
}

impl Connection {
    /// Connect to `addr`, the timeout applies to the dial and to every
    /// command executed on the connection afterwards.
    pub async fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self, Error> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_elapsed| Error::Timeout)??;

        Ok(Self {
            stream: stream.into(),
            timeout,
        })
    }

    /// Like `connect`, but the stream is wrapped in TLS. The timeout covers
    /// the dial and the handshake together.
    pub async fn connect_tls<A: ToSocketAddrs>(
        addr: A,
        server_name: ServerName<'static>,
        config: Arc<ClientConfig>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let connector = TlsConnector::from(config);
        let stream = tokio::time::timeout(timeout, async {
            let stream = TcpStream::connect(addr).await?;
            connector.connect(server_name, stream).await
        })
        .await
        .map_err(|_elapsed| Error::Timeout)??;

        Ok(Self {
            stream: stream.into(),
            timeout,
        })
    }

    pub async fn auth(&mut self, user: Option<&str>, password: &str) -> Result<(), Error> {
        match user {
            Some(user) if !user.is_empty() => self.execute(&["AUTH", user, password]).await,
            _ => self.execute(&["AUTH", password]).await,
        }
    }

    pub async fn execute<T>(&mut self, cmds: &[&str]) -> Result<T, Error>
    where
        T: FromFrame,
    {
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.execute_inner(cmds))
            .await
            .map_err(|_elapsed| Error::Timeout)?
    }

    async fn execute_inner<T>(&mut self, cmds: &[&str]) -> Result<T, Error>
    where
        T: FromFrame,
    {
        let mut buf = BytesMut::with_capacity(256);

        buf.extend_from_slice(format!("*{}\r\n", cmds.len()).as_bytes());
        for cmd in cmds {
            buf.extend_from_slice(format!("${}\r\n{}\r\n", cmd.len(), cmd).as_bytes());
        }
        self.stream.write_all(&buf).await?;

        buf.clear();
        loop {
            if self.stream.read_buf(&mut buf).await? == 0 {
                return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }

            match Frame::parse(&buf) {
                Ok(Some(frame)) => {
                    return match frame {
                        Frame::Error(err) => {
                            if err.starts_with("ERR unknown command") {
                                return Err(Error::UnknownCommand(err.to_string()));
                            }

                            Err(Error::Server(err.to_string()))
                        }
                        _ => T::from_frame(frame),
                    };
                }
                // need more data
                Ok(None) => continue,
                Err(err) => return Err(err),
            }
        }
    }
}
