//! Graphviz DOT reader
//!
//! Accepts `digraph` descriptions whose node ids are integers, optionally
//! quoted. Edge chains (`1 -> 2 -> 3`) expand to consecutive edges.

use crate::common::{Error, Result, Vertex};
use crate::graph::Graph;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "graph/dot.pest"]
struct DotParser;

/// Parse a DOT payload into a [`Graph`].
pub fn parse_dot(data: &[u8]) -> Result<Graph> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::MalformedGraph(format!("payload is not UTF-8: {}", e)))?;

    let root = DotParser::parse(Rule::dot_graph, text)
        .map_err(|e| Error::MalformedGraph(e.to_string()))?
        .next()
        .ok_or_else(|| Error::MalformedGraph("empty document".into()))?;

    let mut graph = Graph::new();
    for statement in root.into_inner() {
        match statement.as_rule() {
            Rule::node_stmt => {
                for pair in statement.into_inner() {
                    if pair.as_rule() == Rule::vertex {
                        graph.add_vertex(vertex_id(pair)?);
                    }
                }
            }
            Rule::edge_stmt => {
                let chain = statement
                    .into_inner()
                    .filter(|pair| pair.as_rule() == Rule::vertex)
                    .map(vertex_id)
                    .collect::<Result<Vec<_>>>()?;
                for hop in chain.windows(2) {
                    graph.add_edge(hop[0], hop[1]);
                }
            }
            _ => {}
        }
    }

    tracing::debug!(
        "Parsed DOT graph: {} vertices, {} edges",
        graph.vertex_count(),
        graph.edge_count()
    );
    Ok(graph)
}

fn vertex_id(pair: Pair<'_, Rule>) -> Result<Vertex> {
    let span = pair.as_str().to_string();
    let numeral = pair
        .into_inner()
        .next()
        .ok_or_else(|| Error::MalformedGraph(format!("vertex without id: {}", span)))?;
    numeral
        .as_str()
        .parse::<Vertex>()
        .map_err(|e| Error::MalformedGraph(format!("vertex id {}: {}", span, e)))
}
