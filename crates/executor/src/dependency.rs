use crate::error::ExecutionError;
use indexmap::IndexMap;
use models::JobSpec;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Job ids in a valid execution order, plus the same jobs grouped into
/// levels whose prerequisites all lie in earlier levels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    order: Vec<String>,
    levels: Vec<Vec<String>>,
}

impl ExecutionPlan {
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Jobs in the same level have no dependency on each other.
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.order.iter().any(|id| id == job_id)
    }
}

/// Order every job in the workflow.
pub fn resolve(jobs: &IndexMap<String, JobSpec>) -> Result<ExecutionPlan, ExecutionError> {
    let selected: Vec<(&str, &JobSpec)> = jobs.iter().map(|(id, job)| (id.as_str(), job)).collect();
    resolve_graph(&selected)
}

/// Order `target` and everything it transitively needs.
pub fn resolve_for(
    jobs: &IndexMap<String, JobSpec>,
    target: &str,
) -> Result<ExecutionPlan, ExecutionError> {
    if !jobs.contains_key(target) {
        return Err(ExecutionError::JobNotFound(target.to_string()));
    }

    let mut wanted: HashSet<&str> = HashSet::new();
    let mut pending = vec![target];
    while let Some(job_id) = pending.pop() {
        if !wanted.insert(job_id) {
            continue;
        }
        if let Some(job) = jobs.get(job_id) {
            pending.extend(job.needs().iter().map(String::as_str));
        }
    }

    // Unknown ids stay out of the selection so resolve_graph reports them.
    let selected: Vec<(&str, &JobSpec)> = jobs
        .iter()
        .filter(|(id, _)| wanted.contains(id.as_str()))
        .map(|(id, job)| (id.as_str(), job))
        .collect();
    resolve_graph(&selected)
}

/// Kahn's algorithm over document indices; the ready set is ordered so ties
/// always go to the job declared first.
fn resolve_graph(jobs: &[(&str, &JobSpec)]) -> Result<ExecutionPlan, ExecutionError> {
    let index: HashMap<&str, usize> = jobs
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (*id, i))
        .collect();

    // needs[i] = prerequisites of job i, dependents[i] = jobs that need job i
    let mut needs: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); jobs.len()];
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); jobs.len()];

    for (i, (job_id, job)) in jobs.iter().enumerate() {
        for needed in job.needs() {
            let Some(&dep) = index.get(needed.as_str()) else {
                return Err(ExecutionError::UnknownDependency {
                    job: job_id.to_string(),
                    dependency: needed.clone(),
                });
            };
            needs[i].insert(dep);
            dependents[dep].insert(i);
        }
    }

    let mut remaining: Vec<usize> = needs.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<usize> = (0..jobs.len()).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(jobs.len());
    let mut depth = vec![0usize; jobs.len()];

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            depth[dependent] = depth[dependent].max(depth[next] + 1);
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < jobs.len() {
        let unresolved: BTreeSet<usize> = (0..jobs.len()).filter(|&i| remaining[i] > 0).collect();
        let cycle = find_cycle(&needs, &unresolved)
            .into_iter()
            .map(|i| jobs[i].0.to_string())
            .collect();
        return Err(ExecutionError::CycleDetected { jobs: cycle });
    }

    let level_count = order.iter().map(|&i| depth[i] + 1).max().unwrap_or(0);
    let mut levels = vec![Vec::new(); level_count];
    let mut by_document: Vec<usize> = order.clone();
    by_document.sort_unstable();
    for i in by_document {
        levels[depth[i]].push(jobs[i].0.to_string());
    }

    Ok(ExecutionPlan {
        order: order.into_iter().map(|i| jobs[i].0.to_string()).collect(),
        levels,
    })
}

/// Every unresolved job still waits on another unresolved job, so following
/// those edges from any of them must eventually revisit a job.
fn find_cycle(needs: &[BTreeSet<usize>], unresolved: &BTreeSet<usize>) -> Vec<usize> {
    let Some(&start) = unresolved.first() else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let next = needs[current].iter().copied().find(|n| unresolved.contains(n));
        let Some(next) = next else {
            return path;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle = path.split_off(pos);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}
