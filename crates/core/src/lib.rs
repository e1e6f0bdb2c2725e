pub mod compare;
pub mod decoder;
pub mod encoder;
pub mod opcode;
pub mod render;
pub mod strip;

pub use compare::{BytecodeComparator, Comparison, ImmutableReferences, Verdict, compare};
pub use decoder::{Decoded, Instruction, decode};
pub use strip::{TrimmedBytecode, trim};
