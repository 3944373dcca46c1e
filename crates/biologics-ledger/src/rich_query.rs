//! Rich query evaluation shared by the bundled backends.
//!
//! Queries use the JSON selector/sort dialect of document-store ledgers:
//!
//! ```json
//! {"selector": {"orderId": {"$exists": true}}, "sort": [{"createdAt": "desc"}]}
//! ```
//!
//! Supported selector operators are `$exists` and `$eq`; a plain value is an
//! implicit `$eq`. Field names may address nested members with dots. Sort
//! keys follow document collation order (missing, null, booleans, numbers,
//! strings, arrays, objects) with the record key as the final tiebreaker, so
//! pages are stable across calls.

use crate::LedgerError;
use biologics_types::{KeyValue, QueryResponseMetadata, SortOrder};
use serde_json::{Map, Value};
use std::cmp::Ordering;

const BOOKMARK_PREFIX: &str = "g1";

/// One predicate of a selector.
#[derive(Debug, Clone, PartialEq)]
enum Condition {
	Exists(bool),
	Equals(Value),
}

/// A parsed rich query.
#[derive(Debug, Clone, PartialEq)]
pub struct RichQuery {
	selector: Vec<(String, Condition)>,
	sort: Vec<(String, SortOrder)>,
}

impl RichQuery {
	/// Parses a JSON query descriptor.
	pub fn parse(query: &str) -> Result<Self, LedgerError> {
		let root: Value = serde_json::from_str(query)
			.map_err(|e| LedgerError::Query(format!("query is not valid JSON: {}", e)))?;
		let root = root
			.as_object()
			.ok_or_else(|| LedgerError::Query("query must be a JSON object".into()))?;

		let selector = match root.get("selector") {
			Some(Value::Object(fields)) => parse_selector(fields)?,
			Some(_) => return Err(LedgerError::Query("selector must be an object".into())),
			None => Vec::new(),
		};

		let sort = match root.get("sort") {
			Some(Value::Array(keys)) => keys.iter().map(parse_sort_key).collect::<Result<_, _>>()?,
			Some(_) => return Err(LedgerError::Query("sort must be an array".into())),
			None => Vec::new(),
		};

		Ok(Self { selector, sort })
	}

	/// Whether a JSON document satisfies every selector condition.
	pub fn matches(&self, document: &Value) -> bool {
		self.selector.iter().all(|(field, condition)| {
			let found = lookup(document, field);
			match condition {
				Condition::Exists(expected) => found.is_some() == *expected,
				Condition::Equals(expected) => found == Some(expected),
			}
		})
	}

	/// Filters, sorts and pages `records`.
	///
	/// Values that are not JSON documents never match. An exhausted query
	/// yields an empty page and echoes the caller's bookmark.
	pub fn execute(
		&self,
		records: Vec<KeyValue>,
		page_size: i32,
		bookmark: &str,
	) -> Result<(Vec<KeyValue>, QueryResponseMetadata), LedgerError> {
		if page_size <= 0 {
			return Err(LedgerError::Query(format!(
				"page size must be positive, got {}",
				page_size
			)));
		}
		let offset = decode_bookmark(bookmark)?;

		let mut matched: Vec<(Value, KeyValue)> = records
			.into_iter()
			.filter_map(|record| {
				let document: Value = serde_json::from_slice(&record.value).ok()?;
				self.matches(&document).then_some((document, record))
			})
			.collect();
		matched.sort_by(|(doc_a, rec_a), (doc_b, rec_b)| {
			self.compare(doc_a, doc_b).then_with(|| rec_a.key.cmp(&rec_b.key))
		});

		if offset >= matched.len() {
			let bookmark = if bookmark.is_empty() {
				encode_bookmark(matched.len())
			} else {
				bookmark.to_string()
			};
			return Ok((
				Vec::new(),
				QueryResponseMetadata {
					fetched_records_count: 0,
					bookmark,
				},
			));
		}

		let page: Vec<KeyValue> = matched
			.into_iter()
			.skip(offset)
			.take(page_size as usize)
			.map(|(_, record)| record)
			.collect();
		let metadata = QueryResponseMetadata {
			fetched_records_count: page.len() as i32,
			bookmark: encode_bookmark(offset + page.len()),
		};
		Ok((page, metadata))
	}

	fn compare(&self, a: &Value, b: &Value) -> Ordering {
		for (field, order) in &self.sort {
			let ordering = collate(lookup(a, field), lookup(b, field));
			let ordering = match order {
				SortOrder::Asc => ordering,
				SortOrder::Desc => ordering.reverse(),
			};
			if ordering != Ordering::Equal {
				return ordering;
			}
		}
		Ordering::Equal
	}
}

fn parse_selector(fields: &Map<String, Value>) -> Result<Vec<(String, Condition)>, LedgerError> {
	let mut conditions = Vec::new();
	for (field, criterion) in fields {
		match criterion {
			Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
				for (op, operand) in ops {
					let condition = match op.as_str() {
						"$exists" => Condition::Exists(parse_flag(field, operand)?),
						"$eq" => Condition::Equals(operand.clone()),
						other => {
							return Err(LedgerError::Query(format!(
								"unsupported operator '{}' on field '{}'",
								other, field
							)))
						},
					};
					conditions.push((field.clone(), condition));
				}
			},
			plain => conditions.push((field.clone(), Condition::Equals(plain.clone()))),
		}
	}
	Ok(conditions)
}

// Older clients send `"$exists": "true"` as a string.
fn parse_flag(field: &str, operand: &Value) -> Result<bool, LedgerError> {
	match operand {
		Value::Bool(flag) => Ok(*flag),
		Value::String(s) if s == "true" => Ok(true),
		Value::String(s) if s == "false" => Ok(false),
		_ => Err(LedgerError::Query(format!(
			"$exists on field '{}' expects a boolean",
			field
		))),
	}
}

fn parse_sort_key(key: &Value) -> Result<(String, SortOrder), LedgerError> {
	match key {
		Value::String(field) => Ok((field.clone(), SortOrder::Asc)),
		Value::Object(entry) if entry.len() == 1 => {
			let (field, order) = entry.iter().next().ok_or_else(|| {
				LedgerError::Query("sort key must name exactly one field".into())
			})?;
			let order = order
				.as_str()
				.ok_or_else(|| LedgerError::Query(format!("sort direction of '{}' must be a string", field)))?
				.parse::<SortOrder>()
				.map_err(LedgerError::Query)?;
			Ok((field.clone(), order))
		},
		_ => Err(LedgerError::Query(
			"sort key must be a field name or a single-field object".into(),
		)),
	}
}

fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
	path.split('.')
		.try_fold(document, |current, segment| current.get(segment))
}

fn type_rank(value: Option<&Value>) -> u8 {
	match value {
		None => 0,
		Some(Value::Null) => 1,
		Some(Value::Bool(_)) => 2,
		Some(Value::Number(_)) => 3,
		Some(Value::String(_)) => 4,
		Some(Value::Array(_)) => 5,
		Some(Value::Object(_)) => 6,
	}
}

fn collate(a: Option<&Value>, b: Option<&Value>) -> Ordering {
	match (a, b) {
		(Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
		(Some(Value::Number(x)), Some(Value::Number(y))) => {
			let x = x.as_f64().unwrap_or(f64::NAN);
			let y = y.as_f64().unwrap_or(f64::NAN);
			x.partial_cmp(&y).unwrap_or(Ordering::Equal)
		},
		(Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
		(Some(x @ Value::Array(_)), Some(y @ Value::Array(_)))
		| (Some(x @ Value::Object(_)), Some(y @ Value::Object(_))) => x.to_string().cmp(&y.to_string()),
		_ => type_rank(a).cmp(&type_rank(b)),
	}
}

fn encode_bookmark(offset: usize) -> String {
	format!("{}{}", BOOKMARK_PREFIX, hex::encode((offset as u64).to_be_bytes()))
}

fn decode_bookmark(bookmark: &str) -> Result<usize, LedgerError> {
	if bookmark.is_empty() {
		return Ok(0);
	}
	let invalid = || LedgerError::Query(format!("invalid bookmark '{}'", bookmark));
	let encoded = bookmark.strip_prefix(BOOKMARK_PREFIX).ok_or_else(invalid)?;
	let bytes: [u8; 8] = hex::decode(encoded)
		.map_err(|_| invalid())?
		.try_into()
		.map_err(|_| invalid())?;
	Ok(u64::from_be_bytes(bytes) as usize)
}
