use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{debug, trace};

use super::client::{Agent, SnmpClient};
use super::codec::{Oid, SnmpVersion, Value, VarBind};
use crate::MonitoredTarget;

const NONE: usize = usize::MAX;

enum Op<'a> {
    Get(&'a [Oid]),
    Walk(&'a Oid),
}

/// Reads from one target, negotiating community and protocol version.
///
/// Candidates are tried in order: configured community over v2c then v1,
/// then the default community over v2c then v1. The first candidate the
/// agent answers is remembered and tried first on every later read. When
/// every candidate fails at the transport level the session gives up and
/// answers `None` without further traffic.
pub struct SnmpSession {
    client: Arc<dyn SnmpClient>,
    candidates: Vec<Agent>,
    working: AtomicUsize,
    unreachable: AtomicBool,
}

impl SnmpSession {
    pub fn new(
        client: Arc<dyn SnmpClient>,
        host: &str,
        port: u16,
        community: Option<&str>,
        default_community: &str,
    ) -> Self {
        let mut candidates: Vec<Agent> = Vec::with_capacity(4);
        let communities = community
            .filter(|c| !c.is_empty())
            .into_iter()
            .chain(std::iter::once(default_community));

        for community in communities {
            for version in [SnmpVersion::V2c, SnmpVersion::V1] {
                let agent = Agent {
                    host: host.to_string(),
                    port,
                    community: community.to_string(),
                    version,
                };
                if !candidates.contains(&agent) {
                    candidates.push(agent);
                }
            }
        }

        Self {
            client,
            candidates,
            working: AtomicUsize::new(NONE),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn for_target(
        client: Arc<dyn SnmpClient>,
        target: &MonitoredTarget,
        default_community: &str,
    ) -> Self {
        Self::new(
            client,
            &target.address,
            target.snmp.port,
            target.snmp.community.as_deref(),
            default_community,
        )
    }

    pub fn candidates(&self) -> &[Agent] {
        &self.candidates
    }

    /// The candidate that last got an answer
    pub fn working_agent(&self) -> Option<&Agent> {
        self.candidates.get(self.working.load(Ordering::Relaxed))
    }

    pub fn is_unreachable(&self) -> bool {
        self.unreachable.load(Ordering::Relaxed)
    }

    /// Values for `oids`, exceptions dropped
    pub async fn get(&self, oids: &[Oid]) -> Option<Vec<VarBind>> {
        self.run(Op::Get(oids)).await
    }

    pub async fn get_one(&self, oid: &Oid) -> Option<Value> {
        self.get(std::slice::from_ref(oid))
            .await?
            .into_iter()
            .find(|vb| &vb.oid == oid)
            .map(|vb| vb.value)
    }

    pub async fn walk(&self, root: &Oid) -> Option<Vec<VarBind>> {
        self.run(Op::Walk(root)).await
    }

    async fn run(&self, op: Op<'_>) -> Option<Vec<VarBind>> {
        if self.is_unreachable() {
            return None;
        }

        let working = self.working.load(Ordering::Relaxed);
        let order = (working != NONE)
            .then_some(working)
            .into_iter()
            .chain((0..self.candidates.len()).filter(|idx| *idx != working));

        for idx in order {
            let agent = &self.candidates[idx];
            let result = match op {
                Op::Get(oids) => self.client.get(agent, oids).await,
                Op::Walk(root) => self.client.walk(agent, root).await,
            };

            match result {
                Ok(varbinds) => {
                    self.working.store(idx, Ordering::Relaxed);
                    return Some(
                        varbinds
                            .into_iter()
                            .filter(|vb| !vb.value.is_exception())
                            .collect(),
                    );
                }
                Err(e) if e.is_agent_response() => {
                    self.working.store(idx, Ordering::Relaxed);
                    debug!("{} answered without data: {e}", agent.host);
                    return None;
                }
                Err(e) => {
                    trace!("{} {} via {}: {e}", agent.host, agent.version, agent.community);
                }
            }
        }

        debug!(
            "no community/version combination reached {}",
            self.candidates
                .first()
                .map(|agent| agent.host.as_str())
                .unwrap_or_default()
        );
        self.unreachable.store(true, Ordering::Relaxed);
        None
    }
}
