use crate::{Error, Model, Result, Value};
use std::sync::atomic::{AtomicI64, Ordering};

/// Routes a primary key to one of the shards of a collection.
pub trait ShardSelector: Send + Sync {
    fn select(&self, key: &Value, shards: usize) -> Result<usize>;
}

/// Default routing: integers modulo the shard count, uuids by their 128 bit value, text by a
/// fold of its bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeySelector;

impl ShardSelector for KeySelector {
    fn select(&self, key: &Value, shards: usize) -> Result<usize> {
        if shards <= 1 {
            return Ok(0);
        }
        let n = shards as u128;
        let bucket = match key {
            Value::Uuid(Some(v)) => v.as_u128() % n,
            Value::Varchar(Some(v)) => {
                v.bytes()
                    .fold(0u128, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u128))
                    % n
            }
            v => match v.as_i128() {
                Some(v) => v.rem_euclid(shards as i128) as u128,
                None => {
                    return Err(Error::msg(format!(
                        "Cannot select a shard from the key {v}"
                    )));
                }
            },
        };
        Ok(bucket as usize)
    }
}

/// Produces primary keys before records are routed to a shard.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, model: &Model) -> Result<Value>;
}

/// Process wide counter.
#[derive(Debug)]
pub struct Sequence {
    next: AtomicI64,
}

impl Sequence {
    pub fn new(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdGenerator for Sequence {
    fn next_id(&self, _model: &Model) -> Result<Value> {
        Ok(Value::Int64(Some(self.next.fetch_add(1, Ordering::Relaxed))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn routing_is_stable() {
        let selector = KeySelector;
        assert_eq!(selector.select(&Value::Int64(Some(7)), 3).unwrap(), 1);
        assert_eq!(selector.select(&Value::UInt8(Some(7)), 3).unwrap(), 1);
        assert_eq!(selector.select(&Value::Int32(Some(-1)), 3).unwrap(), 2);
        assert_eq!(selector.select(&Value::Int64(Some(7)), 1).unwrap(), 0);
        let uuid = Uuid::from_u128(10);
        assert_eq!(selector.select(&Value::Uuid(Some(uuid)), 4).unwrap(), 2);
        let text = Value::Varchar(Some("abc".into()));
        assert_eq!(
            selector.select(&text, 5).unwrap(),
            selector.select(&text, 5).unwrap()
        );
        assert!(selector.select(&Value::Float64(Some(0.5)), 2).is_err());
    }

    #[test]
    fn sequence_counts_up() {
        let model = Model::dynamic("m").build().unwrap();
        let sequence = Sequence::new(10);
        assert_eq!(sequence.next_id(&model).unwrap(), Value::Int64(Some(10)));
        assert_eq!(sequence.next_id(&model).unwrap(), Value::Int64(Some(11)));
    }
}
