use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, instrument};

use super::rates::{CounterSample, rate_between};
use super::session::SnmpSession;
use super::vendor::read_counters;
use super::{oid, oids};

/// Measured throughput of one interface over the discovery window
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceThroughput {
    pub if_index: u32,
    pub name: String,
    pub in_mbps: f64,
    pub out_mbps: f64,
}

impl InterfaceThroughput {
    pub fn total_mbps(&self) -> f64 {
        self.in_mbps + self.out_mbps
    }
}

fn is_loopback(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "lo" || name.starts_with("loopback")
}

/// Busiest interface with any traffic at all. Ties go to the lower index.
pub fn select_busiest(measured: &[InterfaceThroughput]) -> Option<&InterfaceThroughput> {
    measured
        .iter()
        .filter(|iface| iface.total_mbps() > 0.0)
        .max_by(|a, b| {
            a.total_mbps()
                .total_cmp(&b.total_mbps())
                .then(b.if_index.cmp(&a.if_index))
        })
}

async fn sample_all(session: &SnmpSession, indexes: &[u32]) -> HashMap<u32, CounterSample> {
    let mut samples = HashMap::with_capacity(indexes.len());
    for &if_index in indexes {
        if let Some(sample) = read_counters(session, if_index).await {
            samples.insert(if_index, sample);
        }
    }
    samples
}

/// Throughput of every interface, measured by sampling all counters twice
/// `window` apart
#[instrument(skip(session))]
pub async fn measure_interfaces(
    session: &SnmpSession,
    window: Duration,
) -> Option<Vec<InterfaceThroughput>> {
    let interfaces: Vec<(u32, String)> = session
        .walk(&oid(oids::IF_DESCR))
        .await?
        .into_iter()
        .filter_map(|vb| Some((vb.oid.last()?, vb.value.as_text()?)))
        .filter(|(_, name)| !is_loopback(name))
        .collect();

    if interfaces.is_empty() {
        debug!("agent lists no interfaces");
        return None;
    }

    let indexes: Vec<u32> = interfaces.iter().map(|(idx, _)| *idx).collect();
    let first = sample_all(session, &indexes).await;
    tokio::time::sleep(window).await;
    let second = sample_all(session, &indexes).await;

    Some(
        interfaces
            .into_iter()
            .filter_map(|(if_index, name)| {
                let rate = rate_between(first.get(&if_index)?, second.get(&if_index)?)?;
                Some(InterfaceThroughput {
                    if_index,
                    name,
                    in_mbps: rate.in_mbps,
                    out_mbps: rate.out_mbps,
                })
            })
            .collect(),
    )
}

/// Recommended traffic interface: the one moving the most data
pub async fn discover_traffic_interface(
    session: &SnmpSession,
    window: Duration,
) -> Option<InterfaceThroughput> {
    let measured = measure_interfaces(session, window).await?;
    let busiest = select_busiest(&measured).cloned();
    debug!(
        "measured {} interfaces, busiest: {:?}",
        measured.len(),
        busiest.as_ref().map(|iface| &iface.name)
    );
    busiest
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::snmp::codec::Value;
    use crate::snmp::testing::MibClient;

    fn throughput(if_index: u32, total: f64) -> InterfaceThroughput {
        InterfaceThroughput {
            if_index,
            name: format!("ether{if_index}"),
            in_mbps: total,
            out_mbps: 0.0,
        }
    }

    #[test]
    fn test_select_busiest() {
        let measured = vec![throughput(1, 3.0), throughput(2, 40.0), throughput(3, 12.0)];
        assert_eq!(select_busiest(&measured).unwrap().if_index, 2);
    }

    #[test]
    fn test_select_busiest_prefers_lower_index_on_tie() {
        let measured = vec![throughput(4, 5.0), throughput(2, 5.0)];
        assert_eq!(select_busiest(&measured).unwrap().if_index, 2);
    }

    #[test]
    fn test_idle_interfaces_are_not_recommended() {
        let measured = vec![throughput(1, 0.0), throughput(2, 0.0)];
        assert_eq!(select_busiest(&measured), None);
    }

    #[tokio::test]
    async fn test_discovers_busiest_interface() {
        let client = MibClient::new([
            ("1.3.6.1.2.1.2.2.1.2.1", Value::OctetString(b"lo".to_vec())),
            ("1.3.6.1.2.1.2.2.1.2.2", Value::OctetString(b"ether1".to_vec())),
            ("1.3.6.1.2.1.2.2.1.2.3", Value::OctetString(b"wlan1".to_vec())),
            ("1.3.6.1.2.1.31.1.1.1.6.1", Value::Counter64(0)),
            ("1.3.6.1.2.1.31.1.1.1.10.1", Value::Counter64(0)),
            ("1.3.6.1.2.1.31.1.1.1.6.2", Value::Counter64(0)),
            ("1.3.6.1.2.1.31.1.1.1.10.2", Value::Counter64(0)),
            ("1.3.6.1.2.1.31.1.1.1.6.3", Value::Counter64(0)),
            ("1.3.6.1.2.1.31.1.1.1.10.3", Value::Counter64(0)),
        ])
        .tick("1.3.6.1.2.1.31.1.1.1.6.1", 50_000_000)
        .tick("1.3.6.1.2.1.31.1.1.1.6.2", 1_000)
        .tick("1.3.6.1.2.1.31.1.1.1.6.3", 1_000_000)
        .tick("1.3.6.1.2.1.31.1.1.1.10.3", 200_000);

        let session = SnmpSession::new(Arc::new(client), "10.0.0.1", 161, None, "public");
        let busiest = discover_traffic_interface(&session, Duration::from_millis(20))
            .await
            .unwrap();

        // loopback is busiest but never a candidate
        assert_eq!(busiest.if_index, 3);
        assert_eq!(busiest.name, "wlan1");
        assert!(busiest.in_mbps > busiest.out_mbps);
    }
}
