//! Data-flow validation
//!
//! Walks the blocks in declared order and checks that every declared input
//! name is guaranteed to exist by the time its consumer runs. An output of a
//! required block is guaranteed; an output produced only by non-required
//! blocks may be missing at run time and is rejected as unreliable.

use std::collections::HashSet;

use super::block::Block;
use super::engine::EngineError;

pub(crate) fn check_data_flow<'a, I>(blocks: I) -> Result<(), EngineError>
where
    I: IntoIterator<Item = &'a Block>,
{
    let mut available: HashSet<String> = HashSet::new();
    let mut maybe_available: HashSet<String> = HashSet::new();

    for (index, block) in blocks.into_iter().enumerate() {
        if index == 0 {
            // the engine binds its single external input to the first
            // block's first declared input name
            if let Some(first_input) = block.in_names().first() {
                available.insert(first_input.clone());
            }
        }
        for input in block.in_names() {
            if maybe_available.contains(input) {
                return Err(EngineError::UnreliableInput {
                    stage: block.name().to_string(),
                    input: input.clone(),
                });
            }
            if !available.contains(input) {
                return Err(EngineError::MissingInput {
                    stage: block.name().to_string(),
                    input: input.clone(),
                });
            }
        }
        let out = block.out_name().to_string();
        if block.required() {
            maybe_available.remove(&out);
            available.insert(out);
        } else if !available.contains(&out) {
            maybe_available.insert(out);
        }
    }
    Ok(())
}
