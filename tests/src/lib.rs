//! Cross-crate tests for veriscan.

#[cfg(test)]
mod core {
    mod compare;
    mod decoder;
    mod encoder;
    mod properties;
}

#[cfg(test)]
mod verification {
    mod config;
    mod orchestrator;
}
