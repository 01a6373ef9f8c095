//! Front-end configuration.

/// Options controlling the lowering pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Stop at the first failing definition instead of collecting errors
    /// across the whole translation unit.
    pub fail_fast: bool,
    /// Run the CFG well-formedness validator on every lowered function.
    pub validate_ir: bool,
}

impl Config {
    pub fn new() -> Self {
        Self {
            fail_fast: false,
            validate_ir: true,
        }
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_validate_ir(mut self, validate_ir: bool) -> Self {
        self.validate_ir = validate_ir;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new();
        assert!(!config.fail_fast);
        assert!(config.validate_ir);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new().with_fail_fast(true).with_validate_ir(false);
        assert!(config.fail_fast);
        assert!(!config.validate_ir);
    }
}
