//! Engine configuration held by the [`Store`](crate::runtime::Store).

/// Resource limits applied while instantiating and executing modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of active frames (nested calls) per invocation.
    pub max_call_depth: usize,
    /// Maximum number of entries (values, labels and frames) on the execution stack.
    pub max_stack_entries: usize,
    /// Upper bound on any memory's size in 64 KiB pages.
    pub max_memory_pages: u32,
    /// Upper bound on any table's element count.
    pub max_table_elements: u32,
    /// Maximum nesting of host functions re-entering the interpreter.
    pub max_reentrancy: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_call_depth: 1024,
            max_stack_entries: 1 << 20,
            max_memory_pages: 65_536, // 4 GiB
            max_table_elements: 10_000_000,
            max_reentrancy: 64,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_stack_entries(mut self, entries: usize) -> Self {
        self.max_stack_entries = entries;
        self
    }

    pub fn with_max_memory_pages(mut self, pages: u32) -> Self {
        self.max_memory_pages = pages;
        self
    }

    pub fn with_max_table_elements(mut self, elements: u32) -> Self {
        self.max_table_elements = elements;
        self
    }

    pub fn with_max_reentrancy(mut self, depth: usize) -> Self {
        self.max_reentrancy = depth;
        self
    }
}
