use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::model::Plan;
use crate::error::{common, EngineError, ErrorCode, Result};

impl Plan {
    /// Check construction invariants: unique ids, every dependency resolves to
    /// another step of this plan, and the dependency graph is acyclic.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(EngineError::plan_with_code(
                    ErrorCode::PLAN_DUPLICATE_STEP_ID,
                    format!("Step id '{}' is used more than once", step.id),
                    Some(step.id.clone()),
                ));
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(circular(&step.id));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(common::dangling_dependency(&step.id, dep));
                }
            }
        }

        let (graph, _) = self.dependency_graph();
        toposort(&graph, None)
            .map(|_| ())
            .map_err(|cycle| circular(&self.steps[graph[cycle.node_id()]].id))
    }

    /// Indices into `steps` in an order where every step follows its
    /// dependencies; among ready steps the lowest `number` goes first.
    pub fn execution_order(&self) -> Result<Vec<usize>> {
        self.validate()?;

        let index: HashMap<&str, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        let mut remaining: Vec<usize> = self.steps.iter().map(|s| s.depends_on.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];
        for (i, step) in self.steps.iter().enumerate() {
            for dep in &step.depends_on {
                dependents[index[dep.as_str()]].push(i);
            }
        }

        let mut ready: BinaryHeap<Reverse<(u32, usize)>> = self
            .steps
            .iter()
            .enumerate()
            .filter(|(i, _)| remaining[*i] == 0)
            .map(|(i, s)| Reverse((s.number, i)))
            .collect();

        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(Reverse((_, i))) = ready.pop() {
            order.push(i);
            for &next in &dependents[i] {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.push(Reverse((self.steps[next].number, next)));
                }
            }
        }
        Ok(order)
    }

    /// Graph with an edge from each dependency to its dependent. Node weights
    /// are indices into `steps`. Assumes ids are unique and resolvable.
    fn dependency_graph(&self) -> (DiGraph<usize, ()>, HashMap<&str, NodeIndex>) {
        let mut graph = DiGraph::new();
        let nodes: HashMap<&str, NodeIndex> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), graph.add_node(i)))
            .collect();

        for step in &self.steps {
            for dep in &step.depends_on {
                if let (Some(&from), Some(&to)) = (nodes.get(dep.as_str()), nodes.get(step.id.as_str()))
                {
                    graph.add_edge(from, to, ());
                }
            }
        }
        (graph, nodes)
    }
}

fn circular(step_id: &str) -> EngineError {
    EngineError::plan_with_code(
        ErrorCode::PLAN_CIRCULAR_DEPENDENCY,
        format!("Step '{}' is part of a dependency cycle", step_id),
        Some(step_id.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorCode;
    use crate::plan::{Domain, Plan, PlanStep};

    fn plan(steps: Vec<PlanStep>) -> Plan {
        Plan::new(Domain::General, "test", "").with_steps(steps)
    }

    fn ids(plan: &Plan, order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| plan.steps[i].id.clone()).collect()
    }

    #[test]
    fn test_dangling_dependency_rejected() {
        let p = plan(vec![
            PlanStep::new("build", 1, "Build"),
            PlanStep::new("deploy", 2, "Deploy").depends_on(["package"]),
        ]);
        let err = p.validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::PLAN_DANGLING_DEPENDENCY);
        assert!(err.to_string().contains("package"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let p = plan(vec![
            PlanStep::new("lint", 1, "Lint"),
            PlanStep::new("lint", 2, "Lint again"),
        ]);
        assert_eq!(
            p.validate().unwrap_err().code(),
            ErrorCode::PLAN_DUPLICATE_STEP_ID
        );
    }

    #[test]
    fn test_cycles_rejected() {
        let p = plan(vec![
            PlanStep::new("a", 1, "A").depends_on(["c"]),
            PlanStep::new("b", 2, "B").depends_on(["a"]),
            PlanStep::new("c", 3, "C").depends_on(["b"]),
        ]);
        assert_eq!(
            p.validate().unwrap_err().code(),
            ErrorCode::PLAN_CIRCULAR_DEPENDENCY
        );

        let self_loop = plan(vec![PlanStep::new("a", 1, "A").depends_on(["a"])]);
        assert_eq!(
            self_loop.validate().unwrap_err().code(),
            ErrorCode::PLAN_CIRCULAR_DEPENDENCY
        );
    }

    #[test]
    fn test_execution_order_respects_dependencies_then_number() {
        // Authored out of order: verify is listed before deploy
        let p = plan(vec![
            PlanStep::new("verify", 5, "Verify").depends_on(["deploy"]),
            PlanStep::new("docs", 2, "Docs"),
            PlanStep::new("deploy", 4, "Deploy").depends_on(["build"]),
            PlanStep::new("build", 3, "Build"),
            PlanStep::new("lint", 1, "Lint"),
        ]);
        let order = p.execution_order().unwrap();
        assert_eq!(ids(&p, &order), vec!["lint", "docs", "build", "deploy", "verify"]);
    }

    #[test]
    fn test_ready_step_with_lower_number_jumps_ahead() {
        let p = plan(vec![
            PlanStep::new("a", 1, "A"),
            PlanStep::new("c", 3, "C"),
            PlanStep::new("b", 2, "B").depends_on(["a"]),
        ]);
        let order = p.execution_order().unwrap();
        assert_eq!(ids(&p, &order), vec!["a", "b", "c"]);
    }
}
