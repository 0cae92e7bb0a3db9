//! In-process SNMP agent for unit tests

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{Agent, SnmpClient};
use super::codec::{Oid, Value, VarBind};
use super::SnmpResult;

/// Answers any community from a fixed MIB. Counters registered with
/// [`MibClient::tick`] advance by their step after every read.
#[derive(Default)]
pub struct MibClient {
    mib: Mutex<BTreeMap<Oid, Value>>,
    steps: HashMap<Oid, u64>,
}

impl MibClient {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Self {
            mib: Mutex::new(
                entries
                    .into_iter()
                    .map(|(oid, value)| (oid.parse().unwrap(), value))
                    .collect(),
            ),
            steps: HashMap::new(),
        }
    }

    pub fn tick(mut self, oid: &str, step: u64) -> Self {
        self.steps.insert(oid.parse().unwrap(), step);
        self
    }

    fn read(&self, oid: &Oid) -> Value {
        let mut mib = self.mib.lock().unwrap();
        let value = mib.get(oid).cloned().unwrap_or(Value::NoSuchObject);
        if let Some(step) = self.steps.get(oid)
            && let Some(Value::Counter64(current)) = mib.get_mut(oid)
        {
            *current += step;
        }
        value
    }
}

#[async_trait]
impl SnmpClient for MibClient {
    async fn get(&self, _agent: &Agent, oids: &[Oid]) -> SnmpResult<Vec<VarBind>> {
        Ok(oids
            .iter()
            .map(|oid| VarBind::new(oid.clone(), self.read(oid)))
            .collect())
    }

    async fn get_next(&self, _agent: &Agent, oid: &Oid) -> SnmpResult<VarBind> {
        let mib = self.mib.lock().unwrap();
        Ok(mib
            .iter()
            .find(|(k, _)| *k > oid)
            .map(|(k, v)| VarBind::new(k.clone(), v.clone()))
            .unwrap_or_else(|| VarBind::new(oid.clone(), Value::EndOfMibView)))
    }
}
