//! TLS transport built on rustls.
//!
//! The certificate trust policy is the caller's: pass any rustls
//! [`ClientConfig`]. Two common policies are provided as constructors, public
//! web roots and accept-anything for gateways that ship a self-signed
//! certificate.
//!
//! The TLS state machine sits behind a mutex, but socket reads happen outside
//! it. The reader thread blocks on the raw socket, then briefly locks to feed
//! ciphertext in and pull plaintext out, so a writer never waits for a read
//! timeout to elapse.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use rustls::{
    ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{CryptoProvider, ring},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use tracing::{debug, warn};

use super::{DuplexStream, Transport, tcp};
use crate::config::Endpoint;

pub use rustls::Error as TlsError;

const TLS_CHUNK: usize = 4096;

/// Transport over TLS on TCP.
#[derive(Debug, Clone)]
pub struct TlsTransport {
    config: Arc<ClientConfig>,
}

impl TlsTransport {
    /// Use a caller-supplied rustls configuration.
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }

    /// Verify servers against the Mozilla root program.
    pub fn with_webpki_roots() -> Result<Self, TlsError> {
        let roots = RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.to_vec() };
        let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self::new(Arc::new(config)))
    }

    /// Accept any server certificate.
    ///
    /// Only for gateways with self-signed certificates on a trusted network:
    /// the channel is encrypted but the peer is not authenticated.
    pub fn accept_any_certificate() -> Result<Self, TlsError> {
        let provider = Arc::new(ring::default_provider());
        let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth();
        Ok(Self::new(Arc::new(config)))
    }
}

impl Transport for TlsTransport {
    type Stream = TlsLink;

    fn establish(&self, endpoint: &Endpoint, timeout: Duration) -> io::Result<TlsLink> {
        let mut socket = tcp::connect(endpoint, timeout)?;

        let server_name = ServerName::try_from(endpoint.host.clone())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let mut conn =
            ClientConnection::new(Arc::clone(&self.config), server_name).map_err(io::Error::other)?;

        // Socket timeouts bound every handshake round trip
        while conn.is_handshaking() {
            conn.complete_io(&mut socket)?;
        }
        debug!(%endpoint, protocol = ?conn.protocol_version(), "tls handshake complete");

        let reader = socket.try_clone()?;
        Ok(TlsLink { conn: Mutex::new(conn), socket, reader })
    }
}

/// Connected TLS stream.
#[derive(Debug)]
pub struct TlsLink {
    conn: Mutex<ClientConnection>,
    socket: TcpStream,
    reader: TcpStream,
}

impl TlsLink {
    fn flush_tls(&self, conn: &mut ClientConnection) -> io::Result<()> {
        while conn.wants_write() {
            conn.write_tls(&mut &self.socket)?;
        }
        Ok(())
    }
}

impl DuplexStream for TlsLink {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut raw = [0u8; TLS_CHUNK];

        loop {
            {
                let mut conn = self.conn.lock();
                match conn.reader().read(buf) {
                    Ok(n) => return Ok(n),
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {},
                    Err(err) => return Err(err),
                }
            }

            // Blocks up to the socket read timeout, without holding the lock
            let n = (&self.reader).read(&mut raw)?;
            if n == 0 {
                return Ok(0);
            }

            let mut conn = self.conn.lock();
            let mut pending = &raw[..n];
            while !pending.is_empty() {
                conn.read_tls(&mut pending)?;
                conn.process_new_packets().map_err(io::Error::other)?;
            }
            self.flush_tls(&mut conn)?;
        }
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut conn = self.conn.lock();
        conn.writer().write_all(buf)?;
        self.flush_tls(&mut conn)
    }

    fn flush(&self) -> io::Result<()> {
        let mut conn = self.conn.lock();
        conn.writer().flush()?;
        self.flush_tls(&mut conn)?;
        (&self.socket).flush()
    }

    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.reader.set_read_timeout(Some(timeout))
    }

    fn close_read(&self) -> io::Result<()> {
        self.reader.shutdown(Shutdown::Read)
    }

    fn close_write(&self) -> io::Result<()> {
        let mut conn = self.conn.lock();
        conn.send_close_notify();
        if let Err(err) = self.flush_tls(&mut conn) {
            warn!(error = %err, "failed to send close_notify");
        }
        self.socket.shutdown(Shutdown::Write)
    }

    fn close(&self) -> io::Result<()> {
        self.socket.shutdown(Shutdown::Both)
    }
}

/// Verifier that trusts every certificate but still checks handshake
/// signatures, so the session keys are bound to the presented certificate.
#[derive(Debug)]
pub struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, sync::mpsc, thread, time::Instant};

    use rustls::{
        ServerConfig, ServerConnection, StreamOwned,
        pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer},
    };

    use super::*;
    use crate::transport::is_timeout;

    const EXAMPLE_FRAME: [u8; 8] = [0xC0, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0xC0];

    fn server_config() -> Arc<ServerConfig> {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
        let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![cert.der().clone()], key)
            .unwrap();
        Arc::new(config)
    }

    fn loopback() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Endpoint::new("127.0.0.1", port))
    }

    /// Accept one connection and finish the gateway side of the handshake.
    fn accept_tls(listener: &TcpListener) -> StreamOwned<ServerConnection, TcpStream> {
        let (mut socket, _) = listener.accept().unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut conn = ServerConnection::new(server_config()).unwrap();
        while conn.is_handshaking() {
            conn.complete_io(&mut socket).unwrap();
        }
        StreamOwned::new(conn, socket)
    }

    fn establish(endpoint: &Endpoint) -> TlsLink {
        TlsTransport::accept_any_certificate()
            .unwrap()
            .establish(endpoint, Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn builds_both_trust_policies() {
        assert!(TlsTransport::with_webpki_roots().is_ok());
        assert!(TlsTransport::accept_any_certificate().is_ok());
    }

    #[test]
    fn round_trip_over_loopback() {
        let (listener, endpoint) = loopback();
        let gateway = thread::spawn(move || {
            let mut tls = accept_tls(&listener);
            let mut request = [0u8; 4];
            tls.read_exact(&mut request).unwrap();
            tls.write_all(&EXAMPLE_FRAME).unwrap();
            tls.flush().unwrap();

            // Errors with UnexpectedEof unless close_notify arrived first
            let mut rest = Vec::new();
            tls.read_to_end(&mut rest).unwrap();
            (request, rest)
        });

        let link = establish(&endpoint);
        link.set_read_timeout(Duration::from_millis(20)).unwrap();
        link.write_all(&[0x01, 0x02, 0x03, 0x04]).unwrap();
        link.flush().unwrap();

        // Short reads time out until the response lands
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut response = Vec::new();
        let mut buf = [0u8; 64];
        while response.len() < EXAMPLE_FRAME.len() {
            assert!(Instant::now() < deadline, "no response within 5s");
            match link.read(&mut buf) {
                Ok(n) => response.extend_from_slice(&buf[..n]),
                Err(err) => assert!(is_timeout(&err), "unexpected read error: {err}"),
            }
        }
        assert_eq!(response, EXAMPLE_FRAME);

        link.close_write().unwrap();
        let (request, rest) = gateway.join().unwrap();
        assert_eq!(request, [0x01, 0x02, 0x03, 0x04]);
        assert!(rest.is_empty());
        link.close().ok();
    }

    #[test]
    fn idle_read_is_reported_as_timeout() {
        let (listener, endpoint) = loopback();
        let (release, released) = mpsc::channel::<()>();
        let gateway = thread::spawn(move || {
            let _tls = accept_tls(&listener);
            released.recv().ok();
        });

        let link = establish(&endpoint);
        link.set_read_timeout(Duration::from_millis(20)).unwrap();

        let started = Instant::now();
        let err = link.read(&mut [0u8; 16]).unwrap_err();
        assert!(is_timeout(&err), "unexpected read error: {err}");
        assert!(started.elapsed() < Duration::from_secs(2));

        release.send(()).unwrap();
        gateway.join().unwrap();
    }

    #[test]
    fn close_read_unblocks_blocked_read() {
        let (listener, endpoint) = loopback();
        let (release, released) = mpsc::channel::<()>();
        let gateway = thread::spawn(move || {
            let _tls = accept_tls(&listener);
            released.recv().ok();
        });

        let link = Arc::new(establish(&endpoint));
        link.set_read_timeout(Duration::from_secs(10)).unwrap();

        let closer = {
            let link = Arc::clone(&link);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                link.close_read().unwrap();
            })
        };

        let started = Instant::now();
        let result = link.read(&mut [0u8; 16]);
        let elapsed = started.elapsed();

        assert_eq!(result.unwrap(), 0);
        assert!(elapsed < Duration::from_secs(5), "read blocked for {elapsed:?}");

        closer.join().unwrap();
        release.send(()).unwrap();
        gateway.join().unwrap();
    }

    #[test]
    fn silent_handshake_fails_within_deadline() {
        // The kernel completes the TCP handshake; nobody ever answers TLS
        let (_listener, endpoint) = loopback();

        let started = Instant::now();
        let result = TlsTransport::accept_any_certificate()
            .unwrap()
            .establish(&endpoint, Duration::from_millis(200));
        let elapsed = started.elapsed();

        let err = result.unwrap_err();
        assert!(is_timeout(&err), "unexpected establish error: {err}");
        assert!(elapsed < Duration::from_secs(2), "establish took {elapsed:?}");
    }
}
