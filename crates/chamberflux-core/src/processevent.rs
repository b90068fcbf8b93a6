use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};

#[derive(Debug)]
pub enum ProcessEvent {
    Read(ReadEvent),
    Progress(ProgressEvent),
    Done(Result<(), String>),
}

#[derive(Debug)]
pub enum ReadEvent {
    File(String),
    FileRows(String, usize),
    RowsSkipped(String, usize),
    FileFail(String, String),
}

#[derive(Debug)]
pub enum ProgressEvent {
    Started(usize),
    FileDone { file: String, fluxes: usize, done: usize, total: usize },
    ChamberSkipped { file: String, chamber: u32 },
}

pub trait ProcessEventSink {
    fn on_read_event(&mut self, ev: &ReadEvent);
    fn on_progress_event(&mut self, ev: &ProgressEvent);
    fn on_done(&mut self, res: &Result<(), String>);
}

impl ReadEvent {
    pub fn file_fail(file: impl Into<String>, reason: impl ToString) -> Self {
        Self::FileFail(file.into(), reason.to_string())
    }
}

impl ProcessEvent {
    pub fn apply<T: ProcessEventSink + ?Sized>(&self, sink: &mut T) {
        match self {
            ProcessEvent::Read(ev) => sink.on_read_event(ev),
            ProcessEvent::Progress(ev) => sink.on_progress_event(ev),
            ProcessEvent::Done(res) => sink.on_done(res),
        }
    }
}

/// Feed every queued event to `sink` without blocking.
pub fn drain_progress_messages<T: ProcessEventSink>(
    sink: &mut T,
    receiver: &mut UnboundedReceiver<ProcessEvent>,
) {
    loop {
        match receiver.try_recv() {
            Ok(msg) => msg.apply(sink),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[derive(Default)]
    struct Recorder {
        fails: Vec<String>,
        progress: usize,
        done: Option<Result<(), String>>,
    }

    impl ProcessEventSink for Recorder {
        fn on_read_event(&mut self, ev: &ReadEvent) {
            if let ReadEvent::FileFail(file, _) = ev {
                self.fails.push(file.clone());
            }
        }
        fn on_progress_event(&mut self, _ev: &ProgressEvent) {
            self.progress += 1;
        }
        fn on_done(&mut self, res: &Result<(), String>) {
            self.done = Some(res.clone());
        }
    }

    #[test]
    fn drains_all_pending_events() {
        let (tx, mut rx) = unbounded_channel();
        tx.send(ProcessEvent::Read(ReadEvent::file_fail("a.csv", "bad header"))).unwrap();
        tx.send(ProcessEvent::Progress(ProgressEvent::Started(2))).unwrap();
        tx.send(ProcessEvent::Done(Ok(()))).unwrap();

        let mut sink = Recorder::default();
        drain_progress_messages(&mut sink, &mut rx);
        assert_eq!(sink.fails, vec!["a.csv".to_owned()]);
        assert_eq!(sink.progress, 1);
        assert_eq!(sink.done, Some(Ok(())));
    }
}
