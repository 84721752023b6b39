//! Document matcher: equality plus `$`-operators over flat projections.

use serde_json::Value;

use qubic_core::{QubicError, QubicResult};

/// Does `doc` satisfy `filter`? An empty filter matches everything.
pub fn matches(doc: &Value, filter: &Value) -> QubicResult<bool> {
    let Some(map) = filter.as_object() else {
        return Err(QubicError::invalid("filter must be an object"));
    };
    for (key, cond) in map {
        let ok = match key.as_str() {
            "$and" => all_of(doc, cond)?,
            "$or" => any_of(doc, cond)?,
            "$not" => !matches(doc, cond)?,
            field => field_matches(doc.get(field).unwrap_or(&Value::Null), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_of(doc: &Value, cond: &Value) -> QubicResult<bool> {
    let Some(list) = cond.as_array() else {
        return Err(QubicError::invalid("$and expects an array"));
    };
    for f in list {
        if !matches(doc, f)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(doc: &Value, cond: &Value) -> QubicResult<bool> {
    let Some(list) = cond.as_array() else {
        return Err(QubicError::invalid("$or expects an array"));
    };
    for f in list {
        if matches(doc, f)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn field_matches(value: &Value, cond: &Value) -> QubicResult<bool> {
    // A plain value means equality; an object is an operator set.
    let Some(ops) = cond.as_object() else {
        return Ok(equals(value, cond));
    };
    if ops.keys().all(|k| !k.starts_with('$')) {
        return Ok(equals(value, cond));
    }

    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compare(value, operand).map_or(false, |o| o == std::cmp::Ordering::Greater),
            "$gte" => compare(value, operand).map_or(false, |o| o != std::cmp::Ordering::Less),
            "$lt" => compare(value, operand).map_or(false, |o| o == std::cmp::Ordering::Less),
            "$lte" => compare(value, operand).map_or(false, |o| o != std::cmp::Ordering::Greater),
            "$in" => operand
                .as_array()
                .map_or(false, |list| list.iter().any(|v| equals(value, v))),
            "$nin" => operand
                .as_array()
                .map_or(false, |list| !list.iter().any(|v| equals(value, v))),
            "$regex" => regex_matches(value, operand)?,
            "$contains" => contains(value, operand),
            "$exists" => {
                let wanted = operand.as_bool().unwrap_or(true);
                (!value.is_null()) == wanted
            }
            other => {
                return Err(QubicError::invalid(format!("unknown operator {other}")));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn equals(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Some(x.cmp(y));
    }
    None
}

fn regex_matches(value: &Value, operand: &Value) -> QubicResult<bool> {
    let Some(pattern) = operand.as_str() else {
        return Err(QubicError::invalid("$regex expects a string pattern"));
    };
    let re = regex::Regex::new(pattern)
        .map_err(|e| QubicError::invalid(format!("bad $regex pattern: {e}")))?;
    Ok(value.as_str().map_or(false, |s| re.is_match(s)))
}

fn contains(value: &Value, operand: &Value) -> bool {
    match value {
        Value::String(s) => operand.as_str().map_or(false, |needle| s.contains(needle)),
        Value::Array(items) => items.iter().any(|v| equals(v, operand)),
        _ => false,
    }
}

/// Sort docs by a `{field: +1|-1}` map; defaults to energy descending.
pub fn sort_docs(docs: &mut [Value], sort: Option<&Value>) {
    let default = serde_json::json!({"energy": -1});
    let sort = sort
        .filter(|s| s.as_object().map_or(false, |m| !m.is_empty()))
        .unwrap_or(&default);
    let Some(keys) = sort.as_object() else { return };

    docs.sort_by(|a, b| {
        for (field, dir) in keys {
            let ord = compare(
                a.get(field).unwrap_or(&Value::Null),
                b.get(field).unwrap_or(&Value::Null),
            )
            .unwrap_or(std::cmp::Ordering::Equal);
            let ord = if dir.as_i64().unwrap_or(1) < 0 {
                ord.reverse()
            } else {
                ord
            };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "id": "n1",
            "content": "rust is memory safe",
            "energy": 0.8,
            "depth": 2,
            "access_count": 7,
            "tags": ["rust", "safety"],
            "sentiment_label": null,
        })
    }

    #[test]
    fn equality_and_comparison_operators() {
        let d = doc();
        assert!(matches(&d, &json!({"id": "n1"})).unwrap());
        assert!(matches(&d, &json!({"energy": {"$gt": 0.5}})).unwrap());
        assert!(matches(&d, &json!({"energy": {"$lte": 0.8}})).unwrap());
        assert!(!matches(&d, &json!({"depth": {"$lt": 2}})).unwrap());
        assert!(matches(&d, &json!({"depth": {"$ne": 3}})).unwrap());
    }

    #[test]
    fn set_membership_operators() {
        let d = doc();
        assert!(matches(&d, &json!({"id": {"$in": ["n1", "n2"]}})).unwrap());
        assert!(matches(&d, &json!({"id": {"$nin": ["n2", "n3"]}})).unwrap());
        assert!(!matches(&d, &json!({"id": {"$in": []}})).unwrap());
    }

    #[test]
    fn string_and_array_operators() {
        let d = doc();
        assert!(matches(&d, &json!({"content": {"$regex": "^rust"}})).unwrap());
        assert!(matches(&d, &json!({"content": {"$contains": "memory"}})).unwrap());
        assert!(matches(&d, &json!({"tags": {"$contains": "rust"}})).unwrap());
        assert!(!matches(&d, &json!({"tags": {"$contains": "python"}})).unwrap());
    }

    #[test]
    fn exists_distinguishes_null_fields() {
        let d = doc();
        assert!(matches(&d, &json!({"sentiment_label": {"$exists": false}})).unwrap());
        assert!(matches(&d, &json!({"energy": {"$exists": true}})).unwrap());
        assert!(matches(&d, &json!({"no_such_field": {"$exists": false}})).unwrap());
    }

    #[test]
    fn logical_combinators() {
        let d = doc();
        assert!(matches(
            &d,
            &json!({"$and": [{"energy": {"$gt": 0.5}}, {"depth": 2}]})
        )
        .unwrap());
        assert!(matches(
            &d,
            &json!({"$or": [{"id": "nope"}, {"id": "n1"}]})
        )
        .unwrap());
        assert!(matches(&d, &json!({"$not": {"id": "nope"}})).unwrap());
        assert!(!matches(&d, &json!({"$not": {"id": "n1"}})).unwrap());
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let d = doc();
        assert!(matches(&d, &json!({"energy": {"$near": 1}})).is_err());
    }

    #[test]
    fn default_sort_is_energy_descending() {
        let mut docs = vec![
            json!({"id": "low", "energy": 0.1}),
            json!({"id": "high", "energy": 0.9}),
            json!({"id": "mid", "energy": 0.5}),
        ];
        sort_docs(&mut docs, None);
        let ids: Vec<&str> = docs.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[test]
    fn explicit_sort_ascending() {
        let mut docs = vec![
            json!({"id": "b", "depth": 2}),
            json!({"id": "a", "depth": 1}),
        ];
        sort_docs(&mut docs, Some(&json!({"depth": 1})));
        assert_eq!(docs[0]["id"], "a");
    }
}
