//! HTTP transport construction
//!
//! Builds the `reqwest` client used to reach the collector. Without
//! credentials the client is plain; with credentials it presents a client
//! identity and trusts exactly the loaded CA set, never the built-in roots.

use loratail_core::config::TlsConfig;
use loratail_core::{CredentialError, LoraTailError};
use reqwest::{Certificate, Client, Identity};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where trusted CA certificates come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustSource {
    /// One PEM file, possibly holding several certificates
    File(PathBuf),
    /// A directory whose every file is one PEM certificate (not recursive)
    Directory(PathBuf),
}

impl TrustSource {
    /// Pick the variant by inspecting the path
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            TrustSource::Directory(path)
        } else {
            TrustSource::File(path)
        }
    }
}

/// Client identity plus trusted issuers for mutual TLS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCredentials {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub trust: TrustSource,
}

impl TransportCredentials {
    /// Credentials from config, only when cert, key and CAs are all set
    pub fn from_config(config: &TlsConfig) -> Option<Self> {
        match (&config.cert, &config.key, &config.trusted_cas) {
            (Some(cert), Some(key), Some(cas)) => Some(Self {
                cert: cert.clone(),
                key: key.clone(),
                trust: TrustSource::from_path(cas.clone()),
            }),
            _ => None,
        }
    }
}

/// The set of CA certificates a secure client trusts
#[derive(Debug, Clone)]
pub struct TrustStore {
    certificates: Vec<Certificate>,
    sources: Vec<PathBuf>,
}

impl TrustStore {
    /// Load CA certificates from a file or directory
    pub fn load(source: &TrustSource) -> Result<Self, CredentialError> {
        match source {
            TrustSource::File(path) => Self::load_bundle(path),
            TrustSource::Directory(path) => Self::load_directory(path),
        }
    }

    fn load_bundle(path: &Path) -> Result<Self, CredentialError> {
        let pem = read_file("CA bundle", path)?;
        let ders = rustls_pemfile::certs(&mut pem.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| malformed("CA bundle", path, e.to_string()))?;
        if ders.is_empty() {
            return Err(malformed("CA bundle", path, "no PEM certificate found".to_string()));
        }

        let mut store = Self::empty();
        for der in ders {
            let cert = Certificate::from_der(der.as_ref())
                .map_err(|e| malformed("CA bundle", path, e.to_string()))?;
            store.push(cert, path.to_path_buf());
        }
        debug!(path = %path.display(), count = store.len(), "Loaded CA bundle");
        Ok(store)
    }

    fn load_directory(dir: &Path) -> Result<Self, CredentialError> {
        let entries = std::fs::read_dir(dir).map_err(|e| CredentialError::Unreadable {
            kind: "trusted CA directory",
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CredentialError::Unreadable {
                kind: "trusted CA directory",
                path: dir.to_path_buf(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        // Deterministic order, so the first malformed entry is always the same one
        files.sort();

        let mut store = Self::empty();
        for path in files {
            let pem = read_file("CA certificate", &path)?;
            let der = match rustls_pemfile::certs(&mut pem.as_slice()).next() {
                Some(Ok(der)) => der,
                Some(Err(e)) => return Err(malformed("CA certificate", &path, e.to_string())),
                None => {
                    return Err(malformed(
                        "CA certificate",
                        &path,
                        "no PEM certificate found".to_string(),
                    ))
                }
            };
            let cert = Certificate::from_der(der.as_ref())
                .map_err(|e| malformed("CA certificate", &path, e.to_string()))?;
            debug!(path = %path.display(), "Loaded CA certificate");
            store.push(cert, path);
        }
        if store.is_empty() {
            return Err(malformed(
                "trusted CA directory",
                dir,
                "no CA certificates found".to_string(),
            ));
        }
        Ok(store)
    }

    fn empty() -> Self {
        Self {
            certificates: Vec::new(),
            sources: Vec::new(),
        }
    }

    fn push(&mut self, cert: Certificate, source: PathBuf) {
        self.certificates.push(cert);
        self.sources.push(source);
    }

    /// Number of trusted issuers
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// File each trusted certificate was read from, in load order
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }
}

/// A ready HTTP client plus what it was built from
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    endpoint: String,
    ingest_file: PathBuf,
    trust: Option<TrustStore>,
}

impl Transport {
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Collector address as host:port
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn ingest_file(&self) -> &Path {
        &self.ingest_file
    }

    /// Trusted issuers, present only for a mutual TLS transport
    pub fn trust(&self) -> Option<&TrustStore> {
        self.trust.as_ref()
    }

    pub fn is_secure(&self) -> bool {
        self.trust.is_some()
    }
}

/// Builds a [`Transport`]; holds no global state and may be used repeatedly
#[derive(Debug, Clone)]
pub struct TransportBuilder {
    ingest_file: PathBuf,
    endpoint: String,
    timeout: Duration,
    credentials: Option<TransportCredentials>,
}

impl TransportBuilder {
    pub fn new(ingest_file: impl Into<PathBuf>, endpoint: impl Into<String>) -> Self {
        Self {
            ingest_file: ingest_file.into(),
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            credentials: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn credentials(mut self, credentials: Option<TransportCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Validate inputs and build the client
    ///
    /// Only reads the filesystem; nothing is sent over the network.
    pub fn build(self) -> Result<Transport, LoraTailError> {
        check_ingest_file(&self.ingest_file)?;

        let builder = Client::builder().timeout(self.timeout);

        let (client, trust) = match &self.credentials {
            None => {
                info!(endpoint = %self.endpoint, "Building insecure transport");
                let client = builder
                    .build()
                    .map_err(|e| CredentialError::Client(e.to_string()))?;
                (client, None)
            }
            Some(credentials) => {
                info!(endpoint = %self.endpoint, "Building mutual TLS transport");
                let identity = load_identity(&credentials.cert, &credentials.key)?;
                let trust = TrustStore::load(&credentials.trust)?;

                let mut builder = builder
                    .use_rustls_tls()
                    .tls_built_in_root_certs(false)
                    .identity(identity);
                for cert in trust.certificates() {
                    builder = builder.add_root_certificate(cert.clone());
                }
                let client = builder
                    .build()
                    .map_err(|e| CredentialError::Client(e.to_string()))?;
                info!(trusted_cas = trust.len(), "Loaded trusted CAs");
                (client, Some(trust))
            }
        };

        Ok(Transport {
            client,
            endpoint: self.endpoint,
            ingest_file: self.ingest_file,
            trust,
        })
    }
}

/// Load a PEM client certificate and private key as one identity
fn load_identity(cert_path: &Path, key_path: &Path) -> Result<Identity, CredentialError> {
    let cert_pem = read_file("client certificate", cert_path)?;
    let key_pem = read_file("client key", key_path)?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| malformed("client certificate", cert_path, e.to_string()))?;
    if certs.is_empty() {
        return Err(malformed(
            "client certificate",
            cert_path,
            "no PEM certificate found".to_string(),
        ));
    }

    match rustls_pemfile::private_key(&mut key_pem.as_slice()) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Err(malformed(
                "client key",
                key_path,
                "no PEM private key found".to_string(),
            ))
        }
        Err(e) => return Err(malformed("client key", key_path, e.to_string())),
    }

    let mut combined = cert_pem;
    combined.push(b'\n');
    combined.extend_from_slice(&key_pem);
    Identity::from_pem(&combined).map_err(|e| {
        malformed(
            "client certificate/key pair",
            cert_path,
            format!("{} (key '{}')", e, key_path.display()),
        )
    })
}

fn read_file(kind: &'static str, path: &Path) -> Result<Vec<u8>, CredentialError> {
    std::fs::read(path).map_err(|e| CredentialError::Unreadable {
        kind,
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// The ingest file must be a readable regular file
fn check_ingest_file(path: &Path) -> Result<(), LoraTailError> {
    let file = std::fs::File::open(path).map_err(|e| {
        let reason = match e.kind() {
            std::io::ErrorKind::NotFound => "does not exist".to_string(),
            _ => format!("cannot be opened: {}", e),
        };
        LoraTailError::Config(format!("ingest file '{}' {}", path.display(), reason))
    })?;
    let metadata = file.metadata().map_err(|e| {
        LoraTailError::Config(format!("ingest file '{}' cannot be inspected: {}", path.display(), e))
    })?;
    if !metadata.is_file() {
        return Err(LoraTailError::Config(format!(
            "ingest file '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(())
}

fn malformed(kind: &'static str, path: &Path, message: String) -> CredentialError {
    CredentialError::Malformed {
        kind,
        path: path.to_path_buf(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorClient;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use tempfile::{NamedTempFile, TempDir};

    fn testdata(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name)
    }

    fn ingest_file() -> NamedTempFile {
        NamedTempFile::new().unwrap()
    }

    /// Accept one TLS connection presenting `cert` and answer 200 to the first request
    fn serve_tls_once(cert: &str, key: &str) -> (String, std::thread::JoinHandle<()>) {
        let certs = rustls_pemfile::certs(&mut std::fs::read(testdata(cert)).unwrap().as_slice())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let key = rustls_pemfile::private_key(&mut std::fs::read(testdata(key)).unwrap().as_slice())
            .unwrap()
            .unwrap();
        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let conn = rustls::ServerConnection::new(Arc::new(config)).unwrap();
            let mut tls = rustls::StreamOwned::new(conn, stream);

            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match tls.read(&mut chunk) {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&chunk[..n]),
                }
            }
            let _ = tls.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            let _ = tls.flush();
            tls.conn.send_close_notify();
            let _ = tls.flush();
        });
        (endpoint, handle)
    }

    fn credentials(trust: TrustSource) -> Option<TransportCredentials> {
        Some(TransportCredentials {
            cert: testdata("client.pem"),
            key: testdata("client.key"),
            trust,
        })
    }

    #[test]
    fn test_missing_ingest_file_is_config_error() {
        let result = TransportBuilder::new("/nonexistent/lora_rx.log", "localhost:3000").build();
        match result {
            Err(LoraTailError::Config(message)) => assert!(message.contains("does not exist")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_directory_as_ingest_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let result = TransportBuilder::new(dir.path(), "localhost:3000").build();
        match result {
            Err(LoraTailError::Config(message)) => {
                assert!(message.contains("not a regular file"), "unexpected message: {}", message)
            }
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_insecure_transport() {
        let file = ingest_file();
        let transport = TransportBuilder::new(file.path(), "localhost:3000")
            .build()
            .unwrap();
        assert!(!transport.is_secure());
        assert!(transport.trust().is_none());
        assert_eq!(transport.endpoint(), "localhost:3000");
        assert_eq!(transport.ingest_file(), file.path());
    }

    #[test]
    fn test_secure_transport_from_ca_directory() {
        let file = ingest_file();
        let transport = TransportBuilder::new(file.path(), "collector:8443")
            .credentials(credentials(TrustSource::Directory(testdata("cas"))))
            .build()
            .unwrap();

        assert!(transport.is_secure());
        let trust = transport.trust().unwrap();
        assert_eq!(trust.len(), 3);
        let names: Vec<String> = trust
            .sources()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ca1.pem", "ca2.pem", "ca3.pem"]);
    }

    #[test]
    fn test_invalid_entry_in_ca_directory_is_named() {
        let file = ingest_file();
        let result = TransportBuilder::new(file.path(), "collector:8443")
            .credentials(credentials(TrustSource::Directory(testdata("cas_with_invalid"))))
            .build();

        match result {
            Err(LoraTailError::Credential(err)) => {
                assert_eq!(err.path(), Some(testdata("cas_with_invalid/broken.pem").as_path()));
                assert!(err.to_string().contains("broken.pem"));
            }
            other => panic!("expected credential error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_ca_bundle_with_several_certificates() {
        let store = TrustStore::load(&TrustSource::File(testdata("bundle.pem"))).unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_ca_directory_is_not_recursive() {
        let dir = TempDir::new().unwrap();
        std::fs::copy(testdata("cas/ca1.pem"), dir.path().join("ca1.pem")).unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("junk.pem"), "not a certificate").unwrap();

        let store = TrustStore::load(&TrustSource::from_path(dir.path())).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_empty_ca_directory_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        match TrustStore::load(&TrustSource::Directory(dir.path().to_path_buf())) {
            Err(err @ CredentialError::Malformed { .. }) => {
                assert_eq!(err.path(), Some(dir.path()));
                assert!(err.to_string().contains("no CA certificates found"));
            }
            other => panic!("expected malformed directory, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn test_empty_bundle_rejected() {
        let mut bundle = NamedTempFile::new().unwrap();
        writeln!(bundle, "nothing to see here").unwrap();
        let result = TrustStore::load(&TrustSource::File(bundle.path().to_path_buf()));
        assert!(matches!(result, Err(CredentialError::Malformed { .. })));
    }

    #[test]
    fn test_unreadable_client_key() {
        let file = ingest_file();
        let result = TransportBuilder::new(file.path(), "collector:8443")
            .credentials(Some(TransportCredentials {
                cert: testdata("client.pem"),
                key: testdata("missing.key"),
                trust: TrustSource::Directory(testdata("cas")),
            }))
            .build();
        match result {
            Err(LoraTailError::Credential(CredentialError::Unreadable { kind, .. })) => {
                assert_eq!(kind, "client key")
            }
            other => panic!("expected unreadable key, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_certificate_used_as_key_is_malformed() {
        let file = ingest_file();
        let result = TransportBuilder::new(file.path(), "collector:8443")
            .credentials(Some(TransportCredentials {
                cert: testdata("client.pem"),
                key: testdata("cas/ca2.pem"),
                trust: TrustSource::Directory(testdata("cas")),
            }))
            .build();
        assert!(matches!(
            result,
            Err(LoraTailError::Credential(CredentialError::Malformed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_secure_transport_accepts_server_from_loaded_ca() {
        let (endpoint, server) = serve_tls_once("server.pem", "server.key");
        let file = ingest_file();
        let transport = TransportBuilder::new(file.path(), endpoint)
            .credentials(credentials(TrustSource::Directory(testdata("cas"))))
            .build()
            .unwrap();

        let collector = CollectorClient::new(transport.client().clone(), transport.endpoint());
        collector.ping().await.unwrap();
        server.join().unwrap();
    }

    #[tokio::test]
    async fn test_secure_transport_rejects_unknown_issuer() {
        let (endpoint, server) = serve_tls_once("untrusted_server.pem", "untrusted_server.key");
        let file = ingest_file();
        let transport = TransportBuilder::new(file.path(), endpoint)
            .credentials(credentials(TrustSource::Directory(testdata("cas"))))
            .build()
            .unwrap();

        let collector = CollectorClient::new(transport.client().clone(), transport.endpoint());
        let result = collector.ping().await;
        assert!(
            matches!(result, Err(loratail_core::OutputError::Delivery { .. })),
            "server signed by an untrusted CA must be refused, got {:?}",
            result
        );
        server.join().unwrap();
    }

    #[test]
    fn test_builder_is_reusable() {
        let file = ingest_file();
        let builder = TransportBuilder::new(file.path(), "collector:8443")
            .credentials(credentials(TrustSource::File(testdata("bundle.pem"))));
        let first = builder.clone().build().unwrap();
        let second = builder.build().unwrap();
        assert_eq!(first.trust().unwrap().len(), second.trust().unwrap().len());
    }

    #[test]
    fn test_credentials_from_partial_config() {
        let config = TlsConfig {
            cert: Some(testdata("client.pem")),
            key: None,
            trusted_cas: Some(testdata("cas")),
        };
        assert!(TransportCredentials::from_config(&config).is_none());

        let config = TlsConfig {
            key: Some(testdata("client.key")),
            ..config
        };
        let credentials = TransportCredentials::from_config(&config).unwrap();
        assert_eq!(credentials.trust, TrustSource::Directory(testdata("cas")));
    }
}
