//! Segment instances retained after instantiation for the bulk table/memory instructions.

use crate::model::Value;

/// Element segment contents kept for `table.init` until `elem.drop`.
#[derive(Debug, Clone, Default)]
pub struct ElemInstance {
    pub refs: Vec<Value>,
}

impl ElemInstance {
    pub fn drop_items(&mut self) {
        self.refs = Vec::new();
    }
}

/// Data segment bytes kept for `memory.init` until `data.drop`.
#[derive(Debug, Clone, Default)]
pub struct DataInstance {
    pub bytes: Vec<u8>,
}

impl DataInstance {
    pub fn drop_bytes(&mut self) {
        self.bytes = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_segments_are_empty() {
        let mut d = DataInstance {
            bytes: b"abc".to_vec(),
        };
        d.drop_bytes();
        assert!(d.bytes.is_empty());

        let mut e = ElemInstance {
            refs: vec![Value::FuncRef(Some(0))],
        };
        e.drop_items();
        assert!(e.refs.is_empty());
    }
}
