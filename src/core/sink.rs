//! Display surface the bridge writes to

/// Output region plus input field of the terminal view
pub trait DisplaySink {
    /// Append shell output to the output region
    fn append_output(&mut self, text: &str);

    /// Replace the contents of the input field
    fn set_input_text(&mut self, text: &str);

    fn clear_input(&mut self) {
        self.set_input_text("");
    }
}

/// Sink that records everything, for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    pub output: String,
    pub input: String,
    pub appends: Vec<String>,
}

#[cfg(test)]
impl DisplaySink for MemorySink {
    fn append_output(&mut self, text: &str) {
        self.output.push_str(text);
        self.appends.push(text.to_string());
    }

    fn set_input_text(&mut self, text: &str) {
        self.input = text.to_string();
    }
}
