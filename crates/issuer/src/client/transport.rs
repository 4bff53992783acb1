//! HTTP transport for the ACME connection.
//!
//! Builds a hyper-util client over a rustls connector with fixed connection
//! limits. Dial and TLS handshake are bounded by [`BoundedConnector`]; the
//! whole request (including body) by [`TimeoutHttpClient`].

use bytes::Bytes;
use http_body_util::Full;
use hyper::Uri;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use instant_acme::HttpClient;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, warn};

use super::ClientError;

/// TCP connection establishment timeout
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Overall timeout for a single ACME request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TLS handshake timeout
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle connections kept per host
pub const MAX_IDLE_PER_HOST: usize = 100;

/// Idle connections are closed after this long
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Transport parameters for the ACME connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    pub dial_timeout: Duration,
    pub request_timeout: Duration,
    pub tls_handshake_timeout: Duration,
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub skip_tls_verify: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            dial_timeout: DIAL_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            tls_handshake_timeout: TLS_HANDSHAKE_TIMEOUT,
            max_idle_per_host: MAX_IDLE_PER_HOST,
            idle_timeout: IDLE_TIMEOUT,
            skip_tls_verify: false,
        }
    }
}

impl TransportSettings {
    pub fn with_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }
}

type Https = HttpsConnector<HttpConnector>;

/// Build the HTTP client instant-acme will use for the ACME server.
pub(crate) fn build_http_client(
    settings: &TransportSettings,
) -> Result<TimeoutHttpClient, ClientError> {
    let tls = tls_config(settings.skip_tls_verify)?;

    let mut http = HttpConnector::new();
    http.set_connect_timeout(Some(settings.dial_timeout));
    http.enforce_http(false);

    let https = HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    let connector = BoundedConnector {
        inner: https,
        timeout: settings.dial_timeout + settings.tls_handshake_timeout,
    };

    let client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(settings.idle_timeout)
        .pool_max_idle_per_host(settings.max_idle_per_host)
        .build(connector);

    debug!(
        dial_timeout = ?settings.dial_timeout,
        tls_handshake_timeout = ?settings.tls_handshake_timeout,
        request_timeout = ?settings.request_timeout,
        skip_tls_verify = settings.skip_tls_verify,
        "Built ACME transport"
    );

    Ok(TimeoutHttpClient {
        inner: client,
        timeout: settings.request_timeout,
    })
}

fn tls_config(skip_verify: bool) -> Result<ClientConfig, ClientError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::Tls(e.to_string()))?;

    let config = if skip_verify {
        warn!("TLS certificate verification disabled for the ACME server");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier { provider }))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(config)
}

/// Connector that bounds dial plus TLS handshake.
#[derive(Clone)]
pub(crate) struct BoundedConnector {
    inner: Https,
    timeout: Duration,
}

type ConnectFuture = Pin<
    Box<
        dyn Future<Output = Result<<Https as tower::Service<Uri>>::Response, BoxError>> + Send,
    >,
>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

impl tower::Service<Uri> for BoundedConnector {
    type Response = <Https as tower::Service<Uri>>::Response;
    type Error = BoxError;
    type Future = ConnectFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let connecting = self.inner.call(uri);
        let timeout = self.timeout;
        Box::pin(async move {
            match tokio::time::timeout(timeout, connecting).await {
                Ok(result) => result,
                Err(_) => Err(format!("connection not established within {timeout:?}").into()),
            }
        })
    }
}

/// instant-acme HTTP client with a per-request deadline.
#[derive(Clone)]
pub(crate) struct TimeoutHttpClient {
    inner: Client<BoundedConnector, Full<Bytes>>,
    timeout: Duration,
}

impl HttpClient for TimeoutHttpClient {
    fn request(
        &self,
        req: http::Request<Full<Bytes>>,
    ) -> Pin<
        Box<dyn Future<Output = Result<instant_acme::BytesResponse, instant_acme::Error>> + Send>,
    > {
        let pending = HttpClient::request(&self.inner, req);
        let timeout = self.timeout;
        Box::pin(async move {
            match tokio::time::timeout(timeout, pending).await {
                Ok(result) => result,
                Err(_) => Err(instant_acme::Error::Str("ACME request timed out")),
            }
        })
    }
}

/// Accepts any server certificate. Only used with `skipTLSVerify`.
#[derive(Debug)]
struct NoVerifier {
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl ServerCertVerifier for NoVerifier {
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
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
