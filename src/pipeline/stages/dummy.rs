//! Dummy: passes rows through unchanged.
//!
//! Used to merge streams, to fan a stream out, or with no output hops as a
//! sink that discards everything.

use crate::pipeline::channel::StageOutputs;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::stage::{InputSchemas, Transform};
use crate::row::{Row, RowType};

pub struct Dummy {
    name: String,
}

impl Dummy {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Transform for Dummy {
    fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType> {
        inputs.single_main(&self.name)
    }

    fn process_row(&mut self, row: Row, outputs: &mut StageOutputs) -> PipelineResult<()> {
        outputs.put(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::graph::HopRole;
    use crate::pipeline::stages::testing::{ints, run_transform};

    #[test]
    fn test_dummy_merges_inputs() {
        let mut dummy = Dummy::new("flatten");
        let outputs = run_transform(
            &mut dummy,
            vec![("a", HopRole::Main, ints(&[1, 2])), ("b", HopRole::Main, ints(&[3]))],
            &["out"],
        )
        .unwrap();
        let mut seen: Vec<i64> = outputs[0].iter().map(|r| r.value(0).as_i64().unwrap()).collect();
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_dummy_without_outputs_discards() {
        let mut dummy = Dummy::new("discard");
        let outputs = run_transform(&mut dummy, vec![("a", HopRole::Main, ints(&[1]))], &[]).unwrap();
        assert!(outputs.is_empty());
    }
}
