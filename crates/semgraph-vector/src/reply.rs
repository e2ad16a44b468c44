//! k-NN reply decoding.
//!
//! Search backends answer in one of two encodings:
//!
//! - map: `{"total_results": n, "results": [{"id": ..., "extra_attributes": {...}}]}`
//! - flat: `[n, id, [field, value, ...], id, [field, value, ...], ...]`
//!
//! Both are decoded into [`SearchReply`] and normalized to a ranked
//! `Vec<Neighbor>`. Anything else is an `IndexResultParse` error carrying the
//! raw payload; a malformed reply is never reported as an empty result.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use semgraph_core::error::{Result, SemgraphError};
use semgraph_core::types::{DocumentId, Neighbor};

const SCORE_FIELD: &str = "vector_score";
const CONTENT_FIELD: &str = "content";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SearchReply {
    Map(MapReply),
    Flat(Vec<Value>),
}

#[derive(Debug, Deserialize)]
pub struct MapReply {
    #[serde(default)]
    pub total_results: Option<Value>,
    pub results: Vec<MapResult>,
}

#[derive(Debug, Deserialize)]
pub struct MapResult {
    pub id: String,
    #[serde(default)]
    pub extra_attributes: Map<String, Value>,
}

/// Decode a raw k-NN reply into neighbors sorted by ascending score. Equal
/// scores keep the backend's order.
pub fn parse_reply(raw: &Value) -> Result<Vec<Neighbor>> {
    let reply: SearchReply = serde_json::from_value(raw.clone())
        .map_err(|e| SemgraphError::index_parse(format!("unrecognized reply shape: {}", e), raw))?;

    let mut neighbors = match reply {
        SearchReply::Map(map) => from_map(map, raw)?,
        SearchReply::Flat(items) => from_flat(&items, raw)?,
    };

    neighbors.sort_by(|a, b| a.score.total_cmp(&b.score));
    Ok(neighbors)
}

fn from_map(reply: MapReply, raw: &Value) -> Result<Vec<Neighbor>> {
    if let Some(total) = &reply.total_results {
        let total = parse_count(total)
            .ok_or_else(|| SemgraphError::index_parse("total_results is not a count", raw))?;
        if total != reply.results.len() as u64 {
            debug!(total, returned = reply.results.len(), "Reply total differs from result count");
        }
    }

    reply
        .results
        .into_iter()
        .map(|result| neighbor(&result.id, &result.extra_attributes, raw))
        .collect()
}

fn from_flat(items: &[Value], raw: &Value) -> Result<Vec<Neighbor>> {
    let (total, rest) = items
        .split_first()
        .ok_or_else(|| SemgraphError::index_parse("empty flat reply", raw))?;
    let total = parse_count(total)
        .ok_or_else(|| SemgraphError::index_parse("flat reply does not start with a count", raw))?;

    if rest.len() % 2 != 0 {
        return Err(SemgraphError::index_parse(
            "flat reply has an id without a field list",
            raw,
        ));
    }
    if total < (rest.len() / 2) as u64 {
        debug!(total, returned = rest.len() / 2, "Reply total below result count");
    }

    rest.chunks_exact(2)
        .map(|pair| {
            let id = pair[0]
                .as_str()
                .ok_or_else(|| SemgraphError::index_parse("flat reply id is not a string", raw))?;
            let fields = field_map(&pair[1], raw)?;
            neighbor(id, &fields, raw)
        })
        .collect()
}

/// Turn `[name, value, name, value, ...]` into a map.
fn field_map(fields: &Value, raw: &Value) -> Result<Map<String, Value>> {
    let list = fields
        .as_array()
        .ok_or_else(|| SemgraphError::index_parse("flat reply fields are not a list", raw))?;
    if list.len() % 2 != 0 {
        return Err(SemgraphError::index_parse(
            "flat reply field list has odd length",
            raw,
        ));
    }

    let mut map = Map::new();
    for pair in list.chunks_exact(2) {
        let name = pair[0]
            .as_str()
            .ok_or_else(|| SemgraphError::index_parse("field name is not a string", raw))?;
        map.insert(name.to_string(), pair[1].clone());
    }
    Ok(map)
}

fn neighbor(id: &str, fields: &Map<String, Value>, raw: &Value) -> Result<Neighbor> {
    let id = DocumentId::parse(id)
        .map_err(|e| SemgraphError::index_parse(format!("bad document id: {}", e), raw))?;

    let score = fields
        .get(SCORE_FIELD)
        .ok_or_else(|| SemgraphError::index_parse(format!("{} missing for {}", SCORE_FIELD, id), raw))
        .and_then(|v| {
            parse_score(v).ok_or_else(|| {
                SemgraphError::index_parse(format!("{} is not a finite number", SCORE_FIELD), raw)
            })
        })?;

    let content = fields
        .get(CONTENT_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Neighbor { id, content, score })
}

/// Scores arrive as JSON numbers or numeric strings.
fn parse_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    score.is_finite().then_some(score)
}

fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}
