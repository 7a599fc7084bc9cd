//! Clustergate - per-identity access proxy for remote Kubernetes clusters

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kube::CustomResourceExt;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clustergate_common::crd::{ClusterCredential, ManagedCluster};
use clustergate_common::{images, kube_utils};
use clustergate_proxy::{
    start_server, AppState, ApiRouter, ClientCertCache, ClusterAccess, ClusterResolver,
    CredentialIssuer, KubeClusterDirectory, KubeStoreConnector, MemoryCertCache, NoopCertCache,
    PkiCertificateIssuer, ServerConfig, TransportBuilder,
};

/// Clustergate - per-identity access proxy for remote Kubernetes clusters
#[derive(Parser, Debug)]
#[command(name = "clustergate", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the proxy server
    Serve(ServeArgs),

    /// Print the platform CRD manifests and exit
    Crd,

    /// List add-on images, or validate a version and print its components
    Images {
        /// Add-on version to show
        version: Option<String>,
    },
}

/// Serve mode arguments
#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "CLUSTERGATE_LISTEN_ADDR", default_value = "0.0.0.0:8443")]
    listen_addr: SocketAddr,

    /// Serving certificate (PEM); plain HTTP when unset
    #[arg(long, env = "CLUSTERGATE_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// Serving key (PEM)
    #[arg(long, env = "CLUSTERGATE_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Kubeconfig of the central control plane; in-cluster config when unset
    #[arg(long, env = "CLUSTERGATE_KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Lifetime of locally cached client certificates in seconds; 0 disables
    #[arg(long, env = "CLUSTERGATE_CERT_CACHE_TTL_SECS", default_value = "3600")]
    cert_cache_ttl_secs: u64,

    /// Maximum number of locally cached client certificates
    #[arg(long, env = "CLUSTERGATE_CERT_CACHE_CAPACITY", default_value = "4096")]
    cert_cache_capacity: usize,

    /// Upstream connect timeout in seconds
    #[arg(long, env = "CLUSTERGATE_CONNECT_TIMEOUT_SECS", default_value = "5")]
    connect_timeout_secs: u64,

    /// Upstream read timeout in seconds (not applied to watch/follow streams)
    #[arg(long, env = "CLUSTERGATE_READ_TIMEOUT_SECS", default_value = "30")]
    read_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => run_server(args).await,
        Commands::Crd => print_crds(),
        Commands::Images { version } => print_images(version.as_deref()),
    }
}

/// Wire the proxy's dependencies and serve until shutdown
async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let client = kube_utils::create_client(args.kubeconfig.as_deref()).await?;

    let transport = TransportBuilder::new(
        Duration::from_secs(args.connect_timeout_secs),
        Duration::from_secs(args.read_timeout_secs),
    );

    let cache: Arc<dyn ClientCertCache> = if args.cert_cache_ttl_secs == 0 {
        Arc::new(NoopCertCache)
    } else {
        Arc::new(MemoryCertCache::new(
            Duration::from_secs(args.cert_cache_ttl_secs),
            args.cert_cache_capacity,
        ))
    };

    let credentials = CredentialIssuer::new(
        Arc::new(KubeStoreConnector::new(transport)),
        Arc::new(PkiCertificateIssuer),
        cache,
    );
    let resolver = ClusterResolver::new(Arc::new(KubeClusterDirectory::new(client)));

    let state = AppState {
        access: Arc::new(ClusterAccess::new(
            resolver,
            Arc::new(credentials),
            transport,
        )),
        router: Arc::new(ApiRouter::new()),
    };

    let tls = load_tls(args.tls_cert.as_deref(), args.tls_key.as_deref()).await?;

    info!(
        addr = %args.listen_addr,
        cert_cache_ttl_secs = args.cert_cache_ttl_secs,
        "Clustergate starting"
    );

    start_server(
        ServerConfig {
            addr: args.listen_addr,
            tls,
        },
        state,
    )
    .await?;

    Ok(())
}

/// Read the serving certificate and key; both or neither must be given
async fn load_tls(
    cert: Option<&Path>,
    key: Option<&Path>,
) -> anyhow::Result<Option<(Vec<u8>, Vec<u8>)>> {
    match (cert, key) {
        (Some(cert), Some(key)) => Ok(Some((
            tokio::fs::read(cert)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read {:?}: {}", cert, e))?,
            tokio::fs::read(key)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read {:?}: {}", key, e))?,
        ))),
        (None, None) => Ok(None),
        (Some(_), None) => anyhow::bail!("--tls-cert is set without --tls-key"),
        (None, Some(_)) => anyhow::bail!("--tls-key is set without --tls-cert"),
    }
}

fn print_crds() -> anyhow::Result<()> {
    let cluster = serde_yaml::to_string(&ManagedCluster::crd())
        .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
    let credential = serde_yaml::to_string(&ClusterCredential::crd())
        .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
    println!("{cluster}---\n{credential}");
    Ok(())
}

fn print_images(version: Option<&str>) -> anyhow::Result<()> {
    match version {
        Some(version) => {
            for image in images::get(version)?.iter() {
                println!("{}", image.base_name());
            }
        }
        None => {
            for image in images::list() {
                println!("{image}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_cert_and_key_are_required_together() {
        assert!(Cli::try_parse_from(["clustergate", "serve", "--tls-cert", "tls.crt"]).is_err());
        assert!(Cli::try_parse_from(["clustergate", "serve", "--tls-key", "tls.key"]).is_err());

        let cli = Cli::try_parse_from([
            "clustergate",
            "serve",
            "--tls-cert",
            "tls.crt",
            "--tls-key",
            "tls.key",
        ])
        .unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.tls_cert, Some(PathBuf::from("tls.crt")));
        assert_eq!(args.tls_key, Some(PathBuf::from("tls.key")));
    }

    #[tokio::test]
    async fn half_configured_tls_is_an_error() {
        let cert = Path::new("tls.crt");
        assert!(load_tls(Some(cert), None).await.is_err());
        assert!(load_tls(None, Some(Path::new("tls.key"))).await.is_err());
        assert!(load_tls(None, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tls_material_is_read_from_disk() {
        let dir = std::env::temp_dir().join(format!("clustergate-tls-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let (cert, key) = (dir.join("tls.crt"), dir.join("tls.key"));
        std::fs::write(&cert, b"cert").unwrap();
        std::fs::write(&key, b"key").unwrap();

        let (cert_pem, key_pem) = load_tls(Some(&cert), Some(&key)).await.unwrap().unwrap();
        assert_eq!(cert_pem, b"cert");
        assert_eq!(key_pem, b"key");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
