use chrono::Local;
use log::{set_boxed_logger, set_max_level, Level, Log, Metadata, Record, SetLoggerError};
use std::io::{stdout, BufWriter, Write};
use std::sync::mpsc;
use std::thread;

const LOG_CHANNEL_CAPACITY: usize = 1024;

enum LogCommand {
    Record(String),
    Flush,
}

/// Leveled logger backed by a bounded channel and a dedicated writer thread,
/// so that session hot paths never block on the stdout lock.
pub struct AmethystLogger {
    max_level: Level,
    sender: mpsc::SyncSender<LogCommand>,
}

impl AmethystLogger {
    fn new(max_level: Level) -> (Self, mpsc::Receiver<LogCommand>) {
        let (sender, receiver) = mpsc::sync_channel(LOG_CHANNEL_CAPACITY);
        (AmethystLogger { max_level, sender }, receiver)
    }

    /// Installs this logger as the process-wide `log` sink at the given level.
    pub fn init(max_level: Level) -> Result<(), SetLoggerError> {
        let (logger, receiver) = AmethystLogger::new(max_level);

        thread::Builder::new()
            .name("amethyst-log-writer".into())
            .spawn(move || {
                let mut writer = BufWriter::new(stdout());
                while let Ok(command) = receiver.recv() {
                    match command {
                        LogCommand::Record(line) => {
                            if let Err(e) = writer.write_all(line.as_bytes()) {
                                eprintln!("amethyst-log: failed to write log record: {e}");
                            }
                        }
                        LogCommand::Flush => {
                            let _ = writer.flush();
                        }
                    }
                }
                let _ = writer.flush();
            })
            .expect("failed to spawn log writer thread");

        set_boxed_logger(Box::new(logger))?;
        set_max_level(max_level.to_level_filter());
        Ok(())
    }
}

impl Log for AmethystLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = Local::now();
        let line = format!(
            "{} {:<5} [{}] {}\n",
            now.format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
        if self.sender.try_send(LogCommand::Record(line)).is_err() {
            eprintln!("amethyst-log: log channel full, dropping record");
        }
    }

    fn flush(&self) {
        let _ = self.sender.send(LogCommand::Flush);
    }
}
