use std::collections::HashSet;

use crate::engine::EngineHandle;
use crate::frame::NodeId;
use crate::Operation;

/// Work handed to the engine in one `execute` call.
///
/// A pending node read by several consumers appears once as `Apply`; later
/// reads are `Reuse` of its node id, so the plan stays as large as the
/// pending graph. Evaluation order is depth-first with inputs left to right,
/// which puts every `Apply` before its `Reuse`s.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePlan {
    /// An imported frame: `tables[row_block][col_block]`.
    Scan { tables: Vec<Vec<EngineHandle>> },
    /// An operation over the results of `inputs`.
    Apply {
        node: NodeId,
        operation: Operation,
        inputs: Vec<EnginePlan>,
    },
    /// The result of the `Apply` with this node id.
    Reuse { node: NodeId },
}

impl EnginePlan {
    /// Number of operations the engine has to run.
    pub fn operation_count(&self) -> usize {
        match self {
            EnginePlan::Scan { .. } | EnginePlan::Reuse { .. } => 0,
            EnginePlan::Apply { inputs, .. } => {
                1 + inputs.iter().map(|p| p.operation_count()).sum::<usize>()
            }
        }
    }

    /// Nodes read through `Reuse`.
    pub fn reused_nodes(&self) -> HashSet<NodeId> {
        let mut out = HashSet::new();
        self.collect_reused(&mut out);
        out
    }

    fn collect_reused(&self, out: &mut HashSet<NodeId>) {
        match self {
            EnginePlan::Scan { .. } => {}
            EnginePlan::Reuse { node } => {
                out.insert(*node);
            }
            EnginePlan::Apply { inputs, .. } => {
                for input in inputs {
                    input.collect_reused(out);
                }
            }
        }
    }

    /// Indented one-node-per-line rendering for logs.
    pub fn display(&self) -> String {
        let mut out = String::new();
        self.fmt_into(&mut out, 0);
        out
    }

    fn fmt_into(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        match self {
            EnginePlan::Scan { tables } => {
                let handles = tables
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|h| h.to_string())
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .collect::<Vec<_>>()
                    .join(" | ");
                out.push_str(&format!("{pad}scan[{handles}]\n"));
            }
            EnginePlan::Apply {
                node,
                operation,
                inputs,
            } => {
                out.push_str(&format!("{pad}{operation} ({node})\n"));
                for input in inputs {
                    input.fmt_into(out, indent + 1);
                }
            }
            EnginePlan::Reuse { node } => out.push_str(&format!("{pad}reuse({node})\n")),
        }
    }
}
