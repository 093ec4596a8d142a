//! Partitioning of the processor graph into thread groups.
//!
//! The planner sees the graph as nodes (processor instances with their
//! [`Role`]) and edges (signal to slot connections, flagged when the slot is
//! queueing). It produces a [`ThreadPlan`]:
//!
//! 1. Processors named in the explicit `[threads]` map go to that group.
//! 2. Every driver without an explicit group gets a group named after itself.
//! 3. A breadth-first walk from each driver over synchronous edges pulls
//!    unassigned processors into the driver's group. Queueing edges are not
//!    followed; they are where threads hand off.
//! 4. Anything still unassigned becomes an idle group of its own.
//!
//! Each group may contain at most one driver.
//!
//! The plan also records the hand-offs between groups: for every consumer
//! group, the groups whose thread can push into its queue. A group's thread
//! covers everything synchronously reachable from its driver. The toolbox uses
//! this to close each queue only after all of its feeders have exited.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::error::{PipelineError, PipelineResult};
use super::processor::Role;

/// A processor as seen by the planner.
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub name: String,
    pub role: Role,
}

/// A connection as seen by the planner (indices into the node list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanEdge {
    pub from: usize,
    pub to: usize,
    pub queueing: bool,
}

/// One planned thread group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPlan {
    pub name: String,
    /// Member indices in declaration order
    pub members: Vec<usize>,
    /// The single driving processor, if any
    pub driver: Option<usize>,
    /// Role of the driver
    pub driver_role: Option<Role>,
}

impl GroupPlan {
    /// A group without a driver never gets a thread.
    pub fn is_idle(&self) -> bool {
        self.driver.is_none()
    }
}

/// Result of planning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadPlan {
    /// Groups in order of first member declaration
    pub groups: Vec<GroupPlan>,
    /// Group index of each processor
    pub assignment: Vec<usize>,
    /// Groups pushing into each consumer group's queue, keyed by consumer group
    pub feeders: BTreeMap<String, BTreeSet<String>>,
}

impl ThreadPlan {
    pub fn group_of(&self, node: usize) -> Option<&GroupPlan> {
        self.assignment.get(node).map(|&g| &self.groups[g])
    }

    pub fn find(&self, name: &str) -> Option<&GroupPlan> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn active_groups(&self) -> impl Iterator<Item = &GroupPlan> {
        self.groups.iter().filter(|g| !g.is_idle())
    }

    /// Groups that push directly into `group`'s queue.
    pub fn feeders_of(&self, group: &str) -> impl Iterator<Item = &str> {
        self.feeders.get(group).into_iter().flatten().map(String::as_str)
    }

    /// Every group whose records can reach `group` through one or more queues.
    /// Contains `group` itself if it sits on a cycle.
    pub fn upstream_of(&self, group: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = self.feeders_of(group).collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next.to_string()) {
                queue.extend(self.feeders_of(next));
            }
        }
        seen
    }

    /// Groups that must exit before `group`'s queue can be closed.
    ///
    /// Groups on a cycle with `group` are left out; the cycle closes as a unit
    /// once everything feeding it from outside has exited.
    pub fn close_after(&self, group: &str) -> BTreeSet<String> {
        let upstream = self.upstream_of(group);
        let mut cycle: BTreeSet<String> = upstream
            .iter()
            .filter(|other| other.as_str() == group || self.upstream_of(other).contains(group))
            .cloned()
            .collect();
        cycle.insert(group.to_string());

        cycle
            .iter()
            .flat_map(|member| self.feeders_of(member))
            .filter(|feeder| !cycle.contains(*feeder))
            .map(str::to_string)
            .collect()
    }

    /// Number of source groups whose records can reach `group`.
    pub fn upstream_sources(&self, group: &str) -> usize {
        self.upstream_of(group)
            .iter()
            .filter(|name| {
                self.find(name)
                    .is_some_and(|g| g.driver_role == Some(Role::Source))
            })
            .count()
    }
}

pub struct Planner;

impl Planner {
    /// Partition `nodes` into thread groups.
    pub fn plan(
        nodes: &[PlanNode],
        edges: &[PlanEdge],
        explicit: &BTreeMap<String, String>,
    ) -> PipelineResult<ThreadPlan> {
        let n = nodes.len();
        let mut assigned: Vec<Option<String>> = vec![None; n];

        // Explicit assignment
        for (processor, group) in explicit {
            let index = nodes
                .iter()
                .position(|node| &node.name == processor)
                .ok_or_else(|| PipelineError::UnknownProcessor(processor.clone()))?;
            assigned[index] = Some(group.clone());
        }

        // Drivers own a group named after themselves unless placed explicitly
        for (index, node) in nodes.iter().enumerate() {
            if node.role.is_driver() && assigned[index].is_none() {
                assigned[index] = Some(node.name.clone());
            }
        }

        // Pull synchronous downstream into each driver's group
        let fwd_adj = Self::build_sync_adjacency(n, edges);
        for (driver, node) in nodes.iter().enumerate() {
            if !node.role.is_driver() {
                continue;
            }
            let group = match &assigned[driver] {
                Some(group) => group.clone(),
                None => unreachable!("drivers are assigned before the downstream walk"),
            };
            for reached in Self::forward_reachability(driver, &fwd_adj, nodes) {
                if assigned[reached].is_none() {
                    tracing::trace!("Processor <{}> joins group <{}>", nodes[reached].name, group);
                    assigned[reached] = Some(group.clone());
                }
            }
        }

        // Leftovers get a group of their own
        for (index, node) in nodes.iter().enumerate() {
            if assigned[index].is_none() {
                assigned[index] = Some(node.name.clone());
            }
        }

        let mut plan = ThreadPlan {
            groups: Vec::new(),
            assignment: Vec::with_capacity(n),
            feeders: BTreeMap::new(),
        };
        for (index, group_name) in assigned.into_iter().enumerate() {
            let group_name = group_name.unwrap_or_else(|| nodes[index].name.clone());
            let group_index = match plan.groups.iter().position(|g| g.name == group_name) {
                Some(existing) => existing,
                None => {
                    plan.groups.push(GroupPlan {
                        name: group_name,
                        members: Vec::new(),
                        driver: None,
                        driver_role: None,
                    });
                    plan.groups.len() - 1
                }
            };

            let group = &mut plan.groups[group_index];
            group.members.push(index);
            if nodes[index].role.is_driver() {
                if let Some(first) = group.driver {
                    return Err(PipelineError::MultiplePrimaries {
                        group: group.name.clone(),
                        first: nodes[first].name.clone(),
                        second: nodes[index].name.clone(),
                    });
                }
                group.driver = Some(index);
                group.driver_role = Some(nodes[index].role);
            }
            plan.assignment.push(group_index);
        }

        plan.feeders = Self::hand_offs(&plan, edges, &fwd_adj);

        for (consumer, feeders) in &plan.feeders {
            let feeders: Vec<&str> = feeders.iter().map(String::as_str).collect();
            tracing::debug!("Queue of group <{}> is fed by [{}]", consumer, feeders.join(", "));
        }
        for group in &plan.groups {
            let members: Vec<&str> = group.members.iter().map(|&m| nodes[m].name.as_str()).collect();
            match group.driver {
                Some(driver) => tracing::info!(
                    "Thread group <{}> driven by <{}>: [{}]",
                    group.name,
                    nodes[driver].name,
                    members.join(", ")
                ),
                None => tracing::debug!(
                    "Thread group <{}> has no driver and will not get a thread: [{}]",
                    group.name,
                    members.join(", ")
                ),
            }
        }

        Ok(plan)
    }

    fn build_sync_adjacency(n: usize, edges: &[PlanEdge]) -> Vec<Vec<usize>> {
        let mut fwd_adj: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in edges {
            if !edge.queueing && edge.from < n && edge.to < n {
                fwd_adj[edge.from].push(edge.to);
            }
        }
        fwd_adj
    }

    /// For each driven group, find the queueing edges its thread can reach and
    /// record the group as a feeder of the receiving group.
    fn hand_offs(
        plan: &ThreadPlan,
        edges: &[PlanEdge],
        fwd_adj: &[Vec<usize>],
    ) -> BTreeMap<String, BTreeSet<String>> {
        let mut feeders: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for group in &plan.groups {
            let Some(driver) = group.driver else {
                continue;
            };
            let on_thread = Self::thread_reach(driver, fwd_adj);
            for edge in edges.iter().filter(|e| e.queueing && on_thread.contains(&e.from)) {
                let Some(target) = plan.group_of(edge.to) else {
                    continue;
                };
                if target.is_idle() {
                    continue;
                }
                feeders
                    .entry(target.name.clone())
                    .or_default()
                    .insert(group.name.clone());
            }
        }
        feeders
    }

    /// Everything a thread starting at `start` runs through synchronous
    /// dispatch, `start` included.
    fn thread_reach(start: usize, fwd_adj: &[Vec<usize>]) -> BTreeSet<usize> {
        let mut reached = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            for &next in &fwd_adj[idx] {
                if reached.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        reached
    }

    /// Nodes reachable from `start` (excluding `start`), in BFS order. The walk
    /// does not continue past another driver.
    fn forward_reachability(start: usize, fwd_adj: &[Vec<usize>], nodes: &[PlanNode]) -> Vec<usize> {
        let mut visited = vec![false; fwd_adj.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        visited[start] = true;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            for &next in &fwd_adj[idx] {
                if !visited[next] {
                    visited[next] = true;
                    if nodes[next].role.is_driver() {
                        continue;
                    }
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }
        order
    }
}
