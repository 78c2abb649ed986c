use crate::registry::{FleetRegistry, Node};
use crate::workdir::WorkDir;
use fleetbench_client::StorageClient;
use fleetbench_common::{FleetError, Result};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

/// Wall-clock time one member took, and its error if the operation failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberTiming {
    #[serde(rename = "elapsed_ms", serialize_with = "millis")]
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl MemberTiming {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadReport {
    pub node: String,
    pub cid: String,
    /// One entry per member identifier
    pub timings: HashMap<String, MemberTiming>,
    #[serde(rename = "total_ms", serialize_with = "millis")]
    pub total: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteReport {
    pub node: String,
    pub filename: String,
    /// Identifier from the first member that finished successfully
    pub cid: Option<String>,
    pub timings: HashMap<String, MemberTiming>,
    #[serde(rename = "total_ms", serialize_with = "millis")]
    pub total: Duration,
}

/// Which members of a node answer their identity request
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub node: String,
    pub timings: HashMap<String, MemberTiming>,
    /// Daemon identity reported by each member that answered
    pub peer_ids: HashMap<String, String>,
    #[serde(rename = "total_ms", serialize_with = "millis")]
    pub total: Duration,
}

impl CheckReport {
    pub fn healthy(&self) -> usize {
        self.timings.values().filter(|t| t.is_ok()).count()
    }
}

fn millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// Runs one operation concurrently against every member of a node
pub struct BenchmarkFanout {
    registry: Arc<FleetRegistry>,
    work_dir: WorkDir,
}

struct Completed<T> {
    elapsed: Duration,
    result: Result<T>,
}

impl BenchmarkFanout {
    pub fn new(registry: Arc<FleetRegistry>, work_dir: WorkDir) -> Self {
        Self { registry, work_dir }
    }

    pub fn registry(&self) -> &FleetRegistry {
        &self.registry
    }

    pub fn work_dir(&self) -> &WorkDir {
        &self.work_dir
    }

    /// Fetch `cid` from every member of `node`
    #[instrument(skip(self))]
    pub async fn read(&self, node: &str, cid: &str) -> Result<ReadReport> {
        let node = self.registry.resolve(node).await?;
        let started = Instant::now();

        let cid_arg: Arc<str> = Arc::from(cid);
        let (slots, _) = fan_out(&node, move |client| {
            let cid = cid_arg.clone();
            async move { client.cat(&cid).await.map(|bytes| bytes.len()) }
        })
        .await;

        let timings = collect_timings(&node, "read", &slots);
        let report = ReadReport {
            node: node.name().to_string(),
            cid: cid.to_string(),
            timings,
            total: started.elapsed(),
        };

        info!(
            "Read {} from {} members of {} in {:?}",
            cid,
            node.len(),
            report.node,
            report.total
        );
        Ok(report)
    }

    /// Upload `<work_dir>/<filename>` to every member of `node`
    #[instrument(skip(self))]
    pub async fn write(&self, node: &str, filename: &str) -> Result<WriteReport> {
        let node = self.registry.resolve(node).await?;
        let path = Arc::new(self.work_dir.existing(filename).await?);
        let started = Instant::now();

        let (slots, completion_order) = fan_out(&node, move |client| {
            let path = path.clone();
            async move { client.add(&path).await }
        })
        .await;

        let timings = collect_timings(&node, "write", &slots);

        let mut cid: Option<String> = None;
        for index in completion_order {
            if let Some(Completed { result: Ok(id), .. }) = &slots[index] {
                match &cid {
                    None => cid = Some(id.clone()),
                    Some(first) if first != id => warn!(
                        "Member {} of {} assigned {} instead of {}",
                        node.members()[index].id,
                        node.name(),
                        id,
                        first
                    ),
                    Some(_) => {}
                }
            }
        }

        let report = WriteReport {
            node: node.name().to_string(),
            filename: filename.to_string(),
            cid,
            timings,
            total: started.elapsed(),
        };

        info!(
            "Wrote {} to {} members of {} in {:?}",
            filename,
            node.len(),
            report.node,
            report.total
        );
        Ok(report)
    }

    /// Ask every member of `node` for its daemon identity
    #[instrument(skip(self))]
    pub async fn check(&self, node: &str) -> Result<CheckReport> {
        let node = self.registry.resolve(node).await?;
        let started = Instant::now();

        let (slots, _) = fan_out(&node, |client| async move { client.id().await }).await;

        let timings = collect_timings(&node, "check", &slots);
        let peer_ids = node
            .members()
            .iter()
            .zip(&slots)
            .filter_map(|(member, slot)| match slot {
                Some(Completed { result: Ok(id), .. }) => Some((member.id.clone(), id.clone())),
                _ => None,
            })
            .collect();

        let report = CheckReport {
            node: node.name().to_string(),
            timings,
            peer_ids,
            total: started.elapsed(),
        };

        info!(
            "{} of {} members of {} answered",
            report.healthy(),
            node.len(),
            report.node
        );
        Ok(report)
    }
}

/// Run `call` once per member and wait for all of them.
///
/// Returns one slot per member (in member order) and the member indices in
/// the order their operations finished.
async fn fan_out<T, F, Fut>(node: &Node, call: F) -> (Vec<Option<Completed<T>>>, Vec<usize>)
where
    T: Send + 'static,
    F: Fn(Arc<dyn StorageClient>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let mut set = JoinSet::new();
    for (index, member) in node.members().iter().enumerate() {
        let operation = call(member.client.clone());
        set.spawn(async move {
            let started = Instant::now();
            let result = operation.await;
            (index, started.elapsed(), result)
        });
    }

    let mut slots: Vec<Option<Completed<T>>> = (0..node.len()).map(|_| None).collect();
    let mut completion_order = Vec::with_capacity(node.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, elapsed, result)) => {
                completion_order.push(index);
                slots[index] = Some(Completed { elapsed, result });
            }
            Err(e) => warn!("Benchmark task for {} died: {}", node.name(), e),
        }
    }

    (slots, completion_order)
}

fn collect_timings<T>(
    node: &Node,
    op: &'static str,
    slots: &[Option<Completed<T>>],
) -> HashMap<String, MemberTiming> {
    node.members()
        .iter()
        .zip(slots)
        .map(|(member, slot)| {
            let timing = match slot {
                Some(done) => {
                    histogram!("fleetbench.member.duration", "op" => op)
                        .record(done.elapsed.as_secs_f64());
                    MemberTiming {
                        elapsed: done.elapsed,
                        error: done.result.as_ref().err().map(FleetError::to_string),
                    }
                }
                None => MemberTiming {
                    elapsed: Duration::ZERO,
                    error: Some("benchmark task aborted".to_string()),
                },
            };

            if let Some(error) = &timing.error {
                counter!("fleetbench.member.failures", "op" => op).increment(1);
                warn!("{} on {} member {} failed: {}", op, node.name(), member.id, error);
            }
            (member.id.clone(), timing)
        })
        .collect()
}
