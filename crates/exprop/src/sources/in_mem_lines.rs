use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;

use crate::engine::LineSource;

/// 📦 A line source that lives entirely in RAM. Gives you the lines, in order, once.
///
/// `failing_after(n, err)` turns it into a source that breaks after handing out `n` lines,
/// which is the only honest way to test what happens when a bucket read dies mid-file.
#[derive(Debug, Default)]
pub struct InMemoryLines {
    lines: VecDeque<String>,
    served: usize,
    // -- (position, the error to return once `served` reaches it)
    fault: Option<(usize, io::Error)>,
}

impl InMemoryLines {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines: lines.into(),
            served: 0,
            fault: None,
        }
    }

    /// 💀 Break after `served` lines with `error`. The error is returned exactly once.
    pub fn failing_after(mut self, served: usize, error: io::Error) -> Self {
        self.fault = Some((served, error));
        self
    }
}

#[async_trait]
impl LineSource for InMemoryLines {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        if self.fault.as_ref().is_some_and(|(at, _)| *at == self.served) {
            if let Some((_, error)) = self.fault.take() {
                return Err(error);
            }
        }
        let line = self.lines.pop_front();
        if line.is_some() {
            self.served += 1;
        }
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_the_fault_lands_exactly_where_it_was_planted() {
        let mut the_source = InMemoryLines::new(vec!["one".into(), "two".into()])
            .failing_after(1, io::Error::other("pulled the plug"));

        assert_eq!(the_source.next_line().await.ok().flatten().as_deref(), Some("one"));
        assert!(the_source.next_line().await.is_err());
    }

    #[tokio::test]
    async fn the_one_where_the_end_stays_the_end() -> anyhow::Result<()> {
        let mut the_source = InMemoryLines::new(vec!["only".into()]);
        assert_eq!(the_source.next_line().await?.as_deref(), Some("only"));
        assert_eq!(the_source.next_line().await?, None);
        assert_eq!(the_source.next_line().await?, None);
        Ok(())
    }
}
