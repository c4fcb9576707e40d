use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use pgwire::tokio::TlsAcceptor;
use pgwire::tokio::tokio_rustls::rustls::ServerConfig as TlsServerConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("both INNKEEP_TLS_CERT and INNKEEP_TLS_KEY must be set, or neither")]
    PartialTls,
}

/// Server settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    /// WAL appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls: Option<TlsPaths>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let tls = match (lookup("INNKEEP_TLS_CERT"), lookup("INNKEEP_TLS_KEY")) {
            (None, None) => None,
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            _ => return Err(ConfigError::PartialTls),
        };

        Ok(Self {
            port: parse_var(&lookup, "INNKEEP_PORT")?.unwrap_or(5433),
            bind: lookup("INNKEEP_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: lookup("INNKEEP_DATA_DIR")
                .unwrap_or_else(|| "./data".into())
                .into(),
            password: lookup("INNKEEP_PASSWORD").unwrap_or_else(|| "innkeep".into()),
            max_connections: parse_var(&lookup, "INNKEEP_MAX_CONNECTIONS")?.unwrap_or(256),
            compact_threshold: parse_var(&lookup, "INNKEEP_COMPACT_THRESHOLD")?.unwrap_or(1000),
            metrics_port: parse_var(&lookup, "INNKEEP_METRICS_PORT")?,
            tls,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

/// Build the TLS acceptor for the configured certificate chain and key.
pub fn load_tls_acceptor(paths: Option<&TlsPaths>) -> io::Result<Option<TlsAcceptor>> {
    let Some(paths) = paths else {
        return Ok(None);
    };

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(File::open(&paths.cert)?))
        .collect::<Result<_, _>>()?;

    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(&paths.key)?))?
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "no private key found in key file"))?;

    let mut config = TlsServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;

    config.alpn_protocols = vec![b"postgresql".to_vec()];

    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 5433);
        assert_eq!(config.listen_addr(), "0.0.0.0:5433");
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.password, "innkeep");
        assert_eq!(config.max_connections, 256);
        assert_eq!(config.compact_threshold, 1000);
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.tls, None);
    }

    #[test]
    fn overrides() {
        let config = config_from(&[
            ("INNKEEP_PORT", "6000"),
            ("INNKEEP_BIND", "127.0.0.1"),
            ("INNKEEP_MAX_CONNECTIONS", " 8 "),
            ("INNKEEP_METRICS_PORT", "9100"),
            ("INNKEEP_TLS_CERT", "/etc/innkeep/cert.pem"),
            ("INNKEEP_TLS_KEY", "/etc/innkeep/key.pem"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:6000");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(
            config.tls.unwrap().cert,
            PathBuf::from("/etc/innkeep/cert.pem")
        );
    }

    #[test]
    fn unparseable_number_is_an_error() {
        let err = config_from(&[("INNKEEP_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "INNKEEP_PORT", .. }));
        assert!(config_from(&[("INNKEEP_COMPACT_THRESHOLD", "-1")]).is_err());
    }

    #[test]
    fn tls_needs_both_paths() {
        let err = config_from(&[("INNKEEP_TLS_CERT", "cert.pem")]).unwrap_err();
        assert!(matches!(err, ConfigError::PartialTls));
        assert!(load_tls_acceptor(None).unwrap().is_none());
    }
}
