use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

use super::codec::{Message, Oid, Pdu, PduType, SnmpVersion, Value, VarBind};
use super::{SnmpError, SnmpResult};

/// Upper bound on rows returned by one walk
pub const MAX_WALK_ROWS: usize = 512;

/// v1 error-status used by agents to signal the end of a walk
const NO_SUCH_NAME: i64 = 2;

/// Where and how to talk to one SNMP agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    pub host: String,
    pub port: u16,
    pub community: String,
    pub version: SnmpVersion,
}

#[async_trait]
pub trait SnmpClient: Send + Sync {
    async fn get(&self, agent: &Agent, oids: &[Oid]) -> SnmpResult<Vec<VarBind>>;

    async fn get_next(&self, agent: &Agent, oid: &Oid) -> SnmpResult<VarBind>;

    /// Every object below `root`, in agent order
    async fn walk(&self, agent: &Agent, root: &Oid) -> SnmpResult<Vec<VarBind>> {
        let mut rows = Vec::new();
        let mut cursor = root.clone();

        while rows.len() < MAX_WALK_ROWS {
            let next = match self.get_next(agent, &cursor).await {
                Ok(next) => next,
                Err(SnmpError::ErrorStatus {
                    status: NO_SUCH_NAME,
                    ..
                }) => break,
                Err(e) => return Err(e),
            };

            // a non-increasing oid would loop forever
            if next.value == Value::EndOfMibView || !next.oid.starts_with(root) || next.oid <= cursor
            {
                break;
            }

            cursor = next.oid.clone();
            rows.push(next);
        }

        Ok(rows)
    }
}

/// [`SnmpClient`] over UDP
#[derive(Debug)]
pub struct UdpSnmpClient {
    timeout: Duration,
    retries: u32,
    next_request_id: AtomicI32,
}

impl UdpSnmpClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            retries: 1,
            next_request_id: AtomicI32::new(rand::random::<i32>() & 0x3fff_ffff),
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[instrument(skip(self, oids), fields(host = %agent.host, version = %agent.version))]
    async fn request(&self, agent: &Agent, pdu_type: PduType, oids: &[Oid]) -> SnmpResult<Pdu> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed) & 0x7fff_ffff;
        let payload =
            Message::request(agent.version, &agent.community, pdu_type, request_id, oids).encode()?;

        let remote = tokio::net::lookup_host((agent.host.as_str(), agent.port))
            .await?
            .next()
            .ok_or_else(|| {
                SnmpError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address for {}", agent.host),
                ))
            })?;

        let local = if remote.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;

        let mut buf = vec![0u8; 65_535];
        for attempt in 0..=self.retries {
            if attempt > 0 {
                trace!("retrying request {request_id} (attempt {attempt})");
            }
            socket.send(&payload).await?;

            let deadline = Instant::now() + self.timeout;
            loop {
                let len = match tokio::time::timeout_at(deadline, socket.recv(&mut buf)).await {
                    Err(_) => break,
                    Ok(result) => result?,
                };

                match Message::decode(&buf[..len]) {
                    Ok(response)
                        if response.pdu.request_id == request_id
                            && response.pdu.pdu_type == PduType::Response =>
                    {
                        if response.pdu.error_status != 0 {
                            return Err(SnmpError::ErrorStatus {
                                status: response.pdu.error_status,
                                index: response.pdu.error_index,
                            });
                        }
                        return Ok(response.pdu);
                    }
                    Ok(other) => trace!("ignoring stale response {}", other.pdu.request_id),
                    Err(e) => debug!("discarding undecodable datagram: {e}"),
                }
            }
        }

        Err(SnmpError::Timeout(self.timeout))
    }
}

#[async_trait]
impl SnmpClient for UdpSnmpClient {
    async fn get(&self, agent: &Agent, oids: &[Oid]) -> SnmpResult<Vec<VarBind>> {
        Ok(self.request(agent, PduType::GetRequest, oids).await?.varbinds)
    }

    async fn get_next(&self, agent: &Agent, oid: &Oid) -> SnmpResult<VarBind> {
        self.request(agent, PduType::GetNextRequest, std::slice::from_ref(oid))
            .await?
            .varbinds
            .into_iter()
            .next()
            .ok_or_else(|| SnmpError::Decode("empty GetNext response".to_string()))
    }
}
