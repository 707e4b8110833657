use crate::{
    config::DnsConfig,
    dns::{DnsError, MxRecord, MxResolver},
};
use anyhow::Result;
use async_trait::async_trait;
use hickory_resolver::{
    config::{NameServerConfig, ResolverConfig, ResolverOpts},
    proto::xfer::Protocol,
    system_conf, TokioResolver,
};
use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};
use tracing::{debug, trace, warn};

/// MX resolver backed by hickory-resolver.
pub struct HickoryMxResolver {
    resolver: TokioResolver,
}

impl HickoryMxResolver {
    /// Creates a resolver from the application's DNS configuration.
    ///
    /// Returns the resolver together with the name servers it queries.
    pub fn from_config(config: &DnsConfig) -> Result<(Self, Vec<SocketAddr>)> {
        let resolver_config = if let Some(resolver_addr_str) = &config.resolver {
            // A configured resolver is used exclusively.
            let mut custom_config = ResolverConfig::new();
            let socket_addr: SocketAddr = resolver_addr_str.parse()?;
            custom_config.add_name_server(NameServerConfig::new(socket_addr, Protocol::Udp));
            custom_config
        } else {
            match system_conf::read_system_conf() {
                Ok((system_config, _)) if !system_config.name_servers().is_empty() => {
                    system_config
                }
                Ok(_) => {
                    warn!("No system DNS servers found, falling back to Cloudflare DNS.");
                    ResolverConfig::cloudflare()
                }
                Err(e) => {
                    warn!(error = %e, "Could not read system DNS configuration, falling back to Cloudflare DNS.");
                    ResolverConfig::cloudflare()
                }
            }
        };

        let mut nameservers: Vec<_> = resolver_config
            .name_servers()
            .iter()
            .map(|ns| ns.socket_addr)
            .collect();
        nameservers.sort();
        nameservers.dedup();

        let mut resolver_opts = ResolverOpts::default();
        // Recipient domains are always fully qualified.
        resolver_opts.ndots = 1;
        resolver_opts.timeout = Duration::from_millis(config.timeout_ms);

        let resolver = hickory_resolver::Resolver::builder_with_config(
            resolver_config,
            hickory_resolver::name_server::TokioConnectionProvider::default(),
        )
        .with_options(resolver_opts)
        .build();

        Ok((Self { resolver }, nameservers))
    }
}

#[async_trait]
impl MxResolver for HickoryMxResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        let start_time = Instant::now();
        let result = self.resolver.mx_lookup(domain).await;
        metrics::histogram!("mx_lookup_duration_seconds").record(start_time.elapsed().as_secs_f64());

        let lookup = match result {
            Ok(lookup) => lookup,
            Err(e) => {
                let err_string = e.to_string();
                metrics::counter!("mx_lookups_total", "status" => "failure").increment(1);
                if is_no_records_error_str(&err_string) {
                    trace!(domain, error = %e, "MX lookup returned no records");
                    return Err(DnsError::NoRecords(domain.to_string()));
                }
                return Err(DnsError::Resolution(err_string));
            }
        };

        let records: Vec<MxRecord> = lookup
            .iter()
            .map(|mx| MxRecord {
                preference: mx.preference(),
                exchange: mx.exchange().to_utf8().trim_end_matches('.').to_string(),
            })
            .filter(|r| !r.exchange.is_empty())
            .collect();

        if records.is_empty() {
            metrics::counter!("mx_lookups_total", "status" => "empty").increment(1);
            return Err(DnsError::NoRecords(domain.to_string()));
        }

        debug!(domain, count = records.len(), "Resolved mail exchanges");
        metrics::counter!("mx_lookups_total", "status" => "success").increment(1);
        Ok(records)
    }
}

fn is_no_records_error_str(err_str: &str) -> bool {
    let lower = err_str.to_lowercase();
    lower.contains("nxdomain") || lower.contains("no records found")
}
