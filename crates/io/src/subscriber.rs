use std::io::BufRead;

use anyhow::Result;
use relay_core::{CommandHandler, CommandSubscriber, MemorySubscriber, RelayError};
use tracing::debug;

/// Command channel fed from a line-oriented reader, typically stdin. Every
/// non-empty line is one payload for every subscribed topic.
#[derive(Default)]
pub struct LineSubscriber {
    inner: MemorySubscriber,
}

impl LineSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads until EOF. Returns the number of lines that reached a handler.
    pub fn pump<R: BufRead>(&self, reader: R) -> Result<usize> {
        let mut delivered = 0;
        for line in reader.lines() {
            let s = line?;
            let payload = s.trim();
            if payload.is_empty() {
                continue;
            }
            let mut handlers = 0;
            for topic in self.inner.topics() {
                handlers += self.inner.deliver(&topic, payload.as_bytes());
            }
            if handlers == 0 {
                debug!("no subscription, dropped {payload:?}");
            } else {
                delivered += 1;
            }
        }
        Ok(delivered)
    }
}

impl CommandSubscriber for LineSubscriber {
    fn subscribe(&self, topic: &str, client_id: &str, handler: CommandHandler) -> Result<(), RelayError> {
        self.inner.subscribe(topic, client_id, handler)
    }

    fn unsubscribe_all(&self) -> usize {
        self.inner.unsubscribe_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Cursor;
    use std::sync::Arc;

    #[test]
    fn lines_reach_subscribers() {
        let sub = LineSubscriber::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        sub.subscribe("gt sprint/commands", "iremoteengineer_0badc0de", Arc::new(move |t: &str, p: &[u8]| {
            sink.lock().push((t.to_string(), String::from_utf8_lossy(p).into_owned()))
        }))
        .unwrap();

        let n = sub.pump(Cursor::new("lf rf\n\n  fuel.20  \n")).unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            seen.lock().as_slice(),
            &[
                ("gt sprint/commands".to_string(), "lf rf".to_string()),
                ("gt sprint/commands".to_string(), "fuel.20".to_string()),
            ]
        );
    }

    #[test]
    fn nothing_delivered_after_unsubscribe() {
        let sub = LineSubscriber::new();
        sub.subscribe("l/commands", "c", Arc::new(|_: &str, _: &[u8]| {})).unwrap();
        assert_eq!(sub.unsubscribe_all(), 1);
        assert_eq!(sub.pump(Cursor::new("lf\n")).unwrap(), 0);
    }
}
