//! Vendor OID profiles
//!
//! Each brand maps logical metrics to an ordered list of candidate
//! [`Source`]s. Candidates are read in order and the first one that yields
//! a plausible value after normalization wins.

use async_trait::async_trait;
use chrono::Utc;
use tracing::trace;

use super::codec::Oid;
use super::rates::{CounterSample, CounterWidth};
use super::session::SnmpSession;
use super::{oid, oids};
use crate::Brand;

/// What an agent says about itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemIdentity {
    pub object_id: Option<Oid>,
    pub descr: Option<String>,
}

impl SystemIdentity {
    fn enterprise(&self) -> Option<u32> {
        let arcs = self.object_id.as_ref()?.arcs();
        (arcs.len() > 6 && arcs[..6] == [1, 3, 6, 1, 4, 1]).then(|| arcs[6])
    }

    fn descr_contains(&self, keyword: &str) -> bool {
        self.descr
            .as_deref()
            .is_some_and(|descr| descr.to_ascii_lowercase().contains(keyword))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalReading {
    pub signal_dbm: Option<f64>,
    /// CCQ or vendor link quality, percent
    pub link_quality: Option<f64>,
    pub snr_db: Option<f64>,
    pub clients: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthReading {
    pub cpu_pct: Option<f64>,
    pub memory_pct: Option<f64>,
    pub disk_pct: Option<f64>,
    pub temperature_c: Option<f64>,
    pub voltage_v: Option<f64>,
}

/// Where a metric can be read from
#[derive(Debug, Clone, Copy)]
pub enum Source {
    Scalar(&'static str),
    /// First row of a table
    FirstRow(&'static str),
    /// Mean over all rows of a table
    MeanOfRows(&'static str),
    /// `used / total` as a percentage
    UsedOfTotal {
        used: &'static str,
        total: &'static str,
    },
    /// `(total - free) / total` as a percentage
    FreeOfTotal {
        free: &'static str,
        total: &'static str,
    },
    /// `100 - idle`
    IdleInverse(&'static str),
}

impl Source {
    async fn read(&self, session: &SnmpSession) -> Option<f64> {
        match *self {
            Source::Scalar(dotted) => session.get_one(&oid(dotted)).await?.as_f64(),
            Source::FirstRow(root) => session
                .walk(&oid(root))
                .await?
                .iter()
                .find_map(|vb| vb.value.as_f64()),
            Source::MeanOfRows(root) => {
                let values: Vec<f64> = session
                    .walk(&oid(root))
                    .await?
                    .iter()
                    .filter_map(|vb| vb.value.as_f64())
                    .collect();
                (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
            }
            Source::UsedOfTotal { used, total } => {
                let used = session.get_one(&oid(used)).await?.as_f64()?;
                let total = session.get_one(&oid(total)).await?.as_f64()?;
                (total > 0.0).then(|| used * 100.0 / total)
            }
            Source::FreeOfTotal { free, total } => {
                let free = session.get_one(&oid(free)).await?.as_f64()?;
                let total = session.get_one(&oid(total)).await?.as_f64()?;
                (total > 0.0).then(|| (total - free) * 100.0 / total)
            }
            Source::IdleInverse(idle) => {
                let idle = session.get_one(&oid(idle)).await?.as_f64()?;
                Some(100.0 - idle)
            }
        }
    }
}

/// First candidate that reads and normalizes to a value
pub async fn read_first(
    session: &SnmpSession,
    sources: &[Source],
    normalize: fn(f64) -> Option<f64>,
) -> Option<f64> {
    for source in sources {
        if session.is_unreachable() {
            return None;
        }
        if let Some(value) = source.read(session).await.and_then(normalize) {
            return Some(value);
        }
        trace!("no plausible value from {source:?}");
    }
    None
}

/// Candidate sources for every logical metric of one brand
#[derive(Debug, Default)]
pub struct MetricTable {
    pub signal: &'static [Source],
    pub link_quality: &'static [Source],
    pub snr: &'static [Source],
    pub clients: &'static [Source],
    pub cpu: &'static [Source],
    pub memory: &'static [Source],
    pub disk: &'static [Source],
    pub temperature: &'static [Source],
    pub voltage: &'static [Source],
}

#[async_trait]
pub trait VendorProfile: Send + Sync {
    fn brand(&self) -> Brand;

    fn identify(&self, identity: &SystemIdentity) -> bool;

    fn metrics(&self) -> &'static MetricTable;

    async fn signal(&self, session: &SnmpSession) -> SignalReading {
        let table = self.metrics();
        SignalReading {
            signal_dbm: read_first(session, table.signal, normalize_dbm).await,
            link_quality: read_first(session, table.link_quality, normalize_percent).await,
            snr_db: read_first(session, table.snr, normalize_snr).await,
            clients: read_first(session, table.clients, normalize_count)
                .await
                .map(|count| count as u32),
        }
    }

    async fn health(&self, session: &SnmpSession) -> HealthReading {
        let table = self.metrics();
        HealthReading {
            cpu_pct: read_first(session, table.cpu, normalize_percent).await,
            memory_pct: read_first(session, table.memory, normalize_percent).await,
            disk_pct: read_first(session, table.disk, normalize_percent).await,
            temperature_c: read_first(session, table.temperature, normalize_temperature).await,
            voltage_v: read_first(session, table.voltage, normalize_voltage).await,
        }
    }

    async fn traffic(&self, session: &SnmpSession, if_index: u32) -> Option<CounterSample> {
        read_counters(session, if_index).await
    }
}

/// Octet counters of one interface, 64-bit when the agent has them
pub async fn read_counters(session: &SnmpSession, if_index: u32) -> Option<CounterSample> {
    let pairs = [
        (oids::IF_HC_IN_OCTETS, oids::IF_HC_OUT_OCTETS, CounterWidth::Bits64),
        (oids::IF_IN_OCTETS, oids::IF_OUT_OCTETS, CounterWidth::Bits32),
    ];

    for (in_root, out_root, width) in pairs {
        let in_oid = oid(in_root).child(if_index);
        let out_oid = oid(out_root).child(if_index);

        let Some(varbinds) = session.get(&[in_oid.clone(), out_oid.clone()]).await else {
            if session.is_unreachable() {
                return None;
            }
            continue;
        };

        let value_of = |wanted: &Oid| {
            varbinds
                .iter()
                .find(|vb| &vb.oid == wanted)
                .and_then(|vb| vb.value.as_u64())
        };

        if let (Some(in_octets), Some(out_octets)) = (value_of(&in_oid), value_of(&out_oid)) {
            return Some(CounterSample {
                if_index,
                width,
                in_octets,
                out_octets,
                sampled_at: Utc::now(),
            });
        }
    }

    None
}

pub async fn read_identity(session: &SnmpSession) -> Option<SystemIdentity> {
    let object_id = oid(oids::SYS_OBJECT_ID);
    let descr = oid(oids::SYS_DESCR);
    let varbinds = session.get(&[object_id.clone(), descr.clone()]).await?;

    let identity = SystemIdentity {
        object_id: varbinds
            .iter()
            .find(|vb| vb.oid == object_id)
            .and_then(|vb| vb.value.as_oid().cloned()),
        descr: varbinds
            .iter()
            .find(|vb| vb.oid == descr)
            .and_then(|vb| vb.value.as_text()),
    };

    (identity.object_id.is_some() || identity.descr.is_some()).then_some(identity)
}

/// Brand from the enterprise number first, then from `sysDescr` keywords
pub fn identify_brand(identity: &SystemIdentity) -> Brand {
    let profiles: [&dyn VendorProfile; 4] = [&Mikrotik, &Ubiquiti, &Cambium, &Mimosa];

    if let Some(enterprise) = identity.enterprise()
        && let Some(profile) = profiles.iter().find(|p| {
            p.identify(&SystemIdentity {
                object_id: Some(Oid::new(vec![1, 3, 6, 1, 4, 1, enterprise])),
                descr: None,
            })
        })
    {
        return profile.brand();
    }

    profiles
        .iter()
        .find(|p| p.identify(identity))
        .map(|p| p.brand())
        .unwrap_or(Brand::Generic)
}

pub fn profile_for(brand: Brand) -> &'static dyn VendorProfile {
    match brand {
        Brand::Mikrotik => &Mikrotik,
        Brand::Ubiquiti => &Ubiquiti,
        Brand::Cambium => &Cambium,
        Brand::Mimosa => &Mimosa,
        Brand::Generic | Brand::Unknown => &Generic,
    }
}

fn matches_vendor(identity: &SystemIdentity, enterprise: u32, keywords: &[&str]) -> bool {
    identity.enterprise() == Some(enterprise)
        || keywords.iter().any(|keyword| identity.descr_contains(keyword))
}

const HOST_CPU: &[Source] = &[
    Source::MeanOfRows(oids::HR_PROCESSOR_LOAD),
    Source::IdleInverse(oids::UCD_CPU_IDLE),
];

const HOST_MEMORY: &[Source] = &[Source::FreeOfTotal {
    free: oids::UCD_MEM_AVAIL,
    total: oids::UCD_MEM_TOTAL,
}];

pub struct Mikrotik;

static MIKROTIK_METRICS: MetricTable = MetricTable {
    signal: &[
        // mtxrWlStatStrength, then the registration table average
        Source::FirstRow("1.3.6.1.4.1.14988.1.1.1.1.1.4"),
        Source::MeanOfRows("1.3.6.1.4.1.14988.1.1.1.2.1.3"),
    ],
    link_quality: &[Source::FirstRow("1.3.6.1.4.1.14988.1.1.1.1.1.9")],
    snr: &[Source::MeanOfRows("1.3.6.1.4.1.14988.1.1.1.2.1.12")],
    clients: &[Source::FirstRow("1.3.6.1.4.1.14988.1.1.1.3.1.6")],
    cpu: HOST_CPU,
    memory: &[Source::UsedOfTotal {
        used: "1.3.6.1.2.1.25.2.3.1.6.65536",
        total: "1.3.6.1.2.1.25.2.3.1.5.65536",
    }],
    disk: &[Source::UsedOfTotal {
        used: "1.3.6.1.2.1.25.2.3.1.6.131072",
        total: "1.3.6.1.2.1.25.2.3.1.5.131072",
    }],
    temperature: &[
        Source::Scalar("1.3.6.1.4.1.14988.1.1.3.10.0"),
        Source::Scalar("1.3.6.1.4.1.14988.1.1.3.11.0"),
    ],
    voltage: &[Source::Scalar("1.3.6.1.4.1.14988.1.1.3.8.0")],
};

#[async_trait]
impl VendorProfile for Mikrotik {
    fn brand(&self) -> Brand {
        Brand::Mikrotik
    }

    fn identify(&self, identity: &SystemIdentity) -> bool {
        matches_vendor(identity, 14988, &["routeros", "mikrotik"])
    }

    fn metrics(&self) -> &'static MetricTable {
        &MIKROTIK_METRICS
    }
}

/// airMAX
pub struct Ubiquiti;

static UBIQUITI_METRICS: MetricTable = MetricTable {
    signal: &[Source::FirstRow("1.3.6.1.4.1.41112.1.4.5.1.5")],
    link_quality: &[
        // airMAX quality, then CCQ
        Source::FirstRow("1.3.6.1.4.1.41112.1.4.6.1.3"),
        Source::FirstRow("1.3.6.1.4.1.41112.1.4.5.1.7"),
    ],
    snr: &[Source::MeanOfRows("1.3.6.1.4.1.41112.1.4.7.1.4")],
    clients: &[Source::FirstRow("1.3.6.1.4.1.41112.1.4.5.1.15")],
    cpu: HOST_CPU,
    memory: HOST_MEMORY,
    disk: &[],
    temperature: &[Source::Scalar("1.3.6.1.4.1.41112.1.4.8.4.0")],
    voltage: &[],
};

#[async_trait]
impl VendorProfile for Ubiquiti {
    fn brand(&self) -> Brand {
        Brand::Ubiquiti
    }

    fn identify(&self, identity: &SystemIdentity) -> bool {
        matches_vendor(identity, 41112, &["airos", "ubnt", "ubiquiti", "airmax"])
    }

    fn metrics(&self) -> &'static MetricTable {
        &UBIQUITI_METRICS
    }
}

/// ePMP and PTP radios
pub struct Cambium;

static CAMBIUM_METRICS: MetricTable = MetricTable {
    signal: &[
        Source::Scalar("1.3.6.1.4.1.17713.21.1.2.3.0"),
        Source::Scalar("1.3.6.1.4.1.17713.7.12.12.0"),
    ],
    link_quality: &[Source::Scalar("1.3.6.1.4.1.17713.21.1.2.19.0")],
    snr: &[Source::Scalar("1.3.6.1.4.1.17713.21.1.2.18.0")],
    clients: &[Source::Scalar("1.3.6.1.4.1.17713.21.1.2.10.0")],
    cpu: &[
        Source::Scalar("1.3.6.1.4.1.17713.21.2.1.64.0"),
        Source::MeanOfRows(oids::HR_PROCESSOR_LOAD),
    ],
    memory: HOST_MEMORY,
    disk: &[],
    temperature: &[Source::Scalar("1.3.6.1.4.1.17713.21.2.1.65.0")],
    voltage: &[],
};

#[async_trait]
impl VendorProfile for Cambium {
    fn brand(&self) -> Brand {
        Brand::Cambium
    }

    fn identify(&self, identity: &SystemIdentity) -> bool {
        matches_vendor(identity, 17713, &["cambium", "epmp", "canopy"])
    }

    fn metrics(&self) -> &'static MetricTable {
        &CAMBIUM_METRICS
    }
}

pub struct Mimosa;

static MIMOSA_METRICS: MetricTable = MetricTable {
    signal: &[Source::MeanOfRows("1.3.6.1.4.1.43356.2.1.2.6.1.1.3")],
    link_quality: &[],
    snr: &[Source::MeanOfRows("1.3.6.1.4.1.43356.2.1.2.6.1.1.5")],
    clients: &[],
    cpu: HOST_CPU,
    memory: HOST_MEMORY,
    disk: &[],
    temperature: &[Source::Scalar("1.3.6.1.4.1.43356.2.1.2.1.8.0")],
    voltage: &[],
};

#[async_trait]
impl VendorProfile for Mimosa {
    fn brand(&self) -> Brand {
        Brand::Mimosa
    }

    fn identify(&self, identity: &SystemIdentity) -> bool {
        matches_vendor(identity, 43356, &["mimosa"])
    }

    fn metrics(&self) -> &'static MetricTable {
        &MIMOSA_METRICS
    }
}

/// Unidentified devices: traffic only
pub struct Generic;

static NO_METRICS: MetricTable = MetricTable {
    signal: &[],
    link_quality: &[],
    snr: &[],
    clients: &[],
    cpu: &[],
    memory: &[],
    disk: &[],
    temperature: &[],
    voltage: &[],
};

#[async_trait]
impl VendorProfile for Generic {
    fn brand(&self) -> Brand {
        Brand::Generic
    }

    fn identify(&self, _identity: &SystemIdentity) -> bool {
        false
    }

    fn metrics(&self) -> &'static MetricTable {
        &NO_METRICS
    }

    async fn signal(&self, _session: &SnmpSession) -> SignalReading {
        SignalReading::default()
    }

    async fn health(&self, _session: &SnmpSession) -> HealthReading {
        HealthReading::default()
    }
}

/// Received power as negative dBm
pub fn normalize_dbm(value: f64) -> Option<f64> {
    let dbm = if value > 0.0 { -value } else { value };
    (dbm > -120.0 && dbm < 0.0).then_some(dbm)
}

pub fn normalize_percent(value: f64) -> Option<f64> {
    (0.0..=100.0).contains(&value).then_some(value)
}

pub fn normalize_snr(value: f64) -> Option<f64> {
    (value > 0.0 && value <= 80.0).then_some(value)
}

pub fn normalize_count(value: f64) -> Option<f64> {
    (value >= 0.0 && value < 100_000.0).then(|| value.trunc())
}

/// Tenths of a degree are common; anything above 150 is assumed to be them
pub fn normalize_temperature(value: f64) -> Option<f64> {
    let celsius = if value > 150.0 { value / 10.0 } else { value };
    (-40.0..=150.0).contains(&celsius).then_some(celsius)
}

/// Telecom gear runs on 12-56V. Raw readings may be volts, decivolts,
/// centivolts or millivolts; the first scale that lands in 10-60V wins.
/// Readings already below that range are taken as volts.
pub fn normalize_voltage(value: f64) -> Option<f64> {
    if value <= 0.0 {
        return None;
    }
    [1.0, 10.0, 100.0, 1000.0]
        .into_iter()
        .map(|divisor| value / divisor)
        .find(|volts| (10.0..=60.0).contains(volts))
        .or((value < 10.0).then_some(value))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::snmp::codec::Value;
    use crate::snmp::testing::MibClient;

    fn identity(object_id: Option<&str>, descr: Option<&str>) -> SystemIdentity {
        SystemIdentity {
            object_id: object_id.map(|s| s.parse().unwrap()),
            descr: descr.map(str::to_string),
        }
    }

    #[test]
    fn test_identify_by_enterprise() {
        assert_eq!(
            identify_brand(&identity(Some("1.3.6.1.4.1.14988.1"), None)),
            Brand::Mikrotik
        );
        assert_eq!(
            identify_brand(&identity(Some("1.3.6.1.4.1.41112.1.4"), Some("Linux"))),
            Brand::Ubiquiti
        );
        assert_eq!(
            identify_brand(&identity(Some("1.3.6.1.4.1.43356.1.1.1"), None)),
            Brand::Mimosa
        );
    }

    #[test]
    fn test_enterprise_beats_keywords() {
        // a Cambium radio whose description mentions a MikroTik uplink
        let id = identity(Some("1.3.6.1.4.1.17713.21"), Some("ePMP to mikrotik core"));
        assert_eq!(identify_brand(&id), Brand::Cambium);
    }

    #[test]
    fn test_identify_by_description() {
        assert_eq!(
            identify_brand(&identity(Some("1.3.6.1.4.1.8072.3.2.10"), Some("airOS XW.v6.3"))),
            Brand::Ubiquiti
        );
        assert_eq!(
            identify_brand(&identity(None, Some("RouterOS CCR1036"))),
            Brand::Mikrotik
        );
        assert_eq!(
            identify_brand(&identity(None, Some("Cisco IOS"))),
            Brand::Generic
        );
    }

    #[test]
    fn test_normalize_dbm() {
        assert_eq!(normalize_dbm(-62.0), Some(-62.0));
        assert_eq!(normalize_dbm(62.0), Some(-62.0));
        assert_eq!(normalize_dbm(0.0), None);
        assert_eq!(normalize_dbm(-150.0), None);
    }

    #[test]
    fn test_normalize_temperature() {
        assert_eq!(normalize_temperature(45.0), Some(45.0));
        assert_eq!(normalize_temperature(452.0), Some(45.2));
        assert_eq!(normalize_temperature(5000.0), None);
    }

    #[test]
    fn test_voltage_scales_into_telecom_range() {
        assert_eq!(normalize_voltage(24.0), Some(24.0));
        assert_eq!(normalize_voltage(243.0), Some(24.3));
        assert_eq!(normalize_voltage(4800.0), Some(48.0));
        assert_eq!(normalize_voltage(53_500.0), Some(53.5));
        assert_eq!(normalize_voltage(5.1), Some(5.1));
        assert_eq!(normalize_voltage(0.0), None);
    }

    #[test]
    fn test_voltage_outside_known_scales_is_vendor_dependent() {
        // neither reading lands in 10-60V at any scale; only check that the
        // result, if any, is a positive voltage
        for raw in [75_000.0, 700.0] {
            if let Some(volts) = normalize_voltage(raw) {
                assert!(volts > 0.0);
            }
        }
    }

    fn session(client: MibClient) -> SnmpSession {
        SnmpSession::new(Arc::new(client), "10.0.0.1", 161, None, "public")
    }

    #[tokio::test]
    async fn test_mikrotik_signal_and_health() {
        let client = MibClient::new([
            ("1.3.6.1.4.1.14988.1.1.1.1.1.4.5", Value::Integer(-58)),
            ("1.3.6.1.4.1.14988.1.1.1.1.1.9.5", Value::Integer(92)),
            ("1.3.6.1.4.1.14988.1.1.1.3.1.6.5", Value::Counter32(14)),
            ("1.3.6.1.2.1.25.3.3.1.2.1", Value::Integer(10)),
            ("1.3.6.1.2.1.25.3.3.1.2.2", Value::Integer(30)),
            ("1.3.6.1.2.1.25.2.3.1.5.65536", Value::Integer(1000)),
            ("1.3.6.1.2.1.25.2.3.1.6.65536", Value::Integer(250)),
            ("1.3.6.1.4.1.14988.1.1.3.10.0", Value::Integer(412)),
            ("1.3.6.1.4.1.14988.1.1.3.8.0", Value::Integer(242)),
        ]);
        let session = session(client);

        let signal = Mikrotik.signal(&session).await;
        assert_eq!(signal.signal_dbm, Some(-58.0));
        assert_eq!(signal.link_quality, Some(92.0));
        assert_eq!(signal.clients, Some(14));
        assert_eq!(signal.snr_db, None);

        let health = Mikrotik.health(&session).await;
        assert_eq!(health.cpu_pct, Some(20.0));
        assert_eq!(health.memory_pct, Some(25.0));
        assert_eq!(health.disk_pct, None);
        assert_eq!(health.temperature_c, Some(41.2));
        assert_eq!(health.voltage_v, Some(24.2));
    }

    #[tokio::test]
    async fn test_implausible_candidate_falls_through() {
        // mtxrWlStatStrength reads 0 when unassociated; the registration
        // table still has real values
        let client = MibClient::new([
            ("1.3.6.1.4.1.14988.1.1.1.1.1.4.5", Value::Integer(0)),
            ("1.3.6.1.4.1.14988.1.1.1.2.1.3.1", Value::Integer(-60)),
            ("1.3.6.1.4.1.14988.1.1.1.2.1.3.2", Value::Integer(-70)),
        ]);

        let signal = Mikrotik.signal(&session(client)).await;
        assert_eq!(signal.signal_dbm, Some(-65.0));
    }

    #[tokio::test]
    async fn test_generic_profile_reads_nothing() {
        let client = MibClient::new([("1.3.6.1.2.1.25.3.3.1.2.1", Value::Integer(10))]);
        let session = session(client);

        assert_eq!(Generic.signal(&session).await, SignalReading::default());
        assert_eq!(Generic.health(&session).await, HealthReading::default());
    }

    #[tokio::test]
    async fn test_traffic_prefers_hc_counters() {
        let client = MibClient::new([
            ("1.3.6.1.2.1.31.1.1.1.6.3", Value::Counter64(5_000_000_000)),
            ("1.3.6.1.2.1.31.1.1.1.10.3", Value::Counter64(7_000_000_000)),
            ("1.3.6.1.2.1.2.2.1.10.3", Value::Counter32(1)),
            ("1.3.6.1.2.1.2.2.1.16.3", Value::Counter32(2)),
        ]);

        let sample = Generic.traffic(&session(client), 3).await.unwrap();
        assert_eq!(sample.in_octets, 5_000_000_000);
        assert_eq!(sample.out_octets, 7_000_000_000);
    }

    #[tokio::test]
    async fn test_traffic_falls_back_to_32bit() {
        let client = MibClient::new([
            ("1.3.6.1.2.1.2.2.1.10.3", Value::Counter32(100)),
            ("1.3.6.1.2.1.2.2.1.16.3", Value::Counter32(200)),
        ]);

        let sample = Ubiquiti.traffic(&session(client), 3).await.unwrap();
        assert_eq!((sample.in_octets, sample.out_octets), (100, 200));
    }

    #[tokio::test]
    async fn test_read_identity() {
        let client = MibClient::new([
            (oids::SYS_OBJECT_ID, Value::ObjectId("1.3.6.1.4.1.14988.1".parse().unwrap())),
            (oids::SYS_DESCR, Value::OctetString(b"RouterOS hAP".to_vec())),
        ]);

        let identity = read_identity(&session(client)).await.unwrap();
        assert_eq!(identify_brand(&identity), Brand::Mikrotik);
    }
}
