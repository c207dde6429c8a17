//! Operator console.
//!
//! Output goes through the `Console` capability so the consume task and the
//! foreground task can both write to it. Input is any line-oriented async
//! reader; the same line stream serves readiness prompts and chat input.

use std::io::{self, Write};

use tokio::io::{AsyncBufRead, Lines};

/// Line-oriented operator output.
pub trait Console: Send + Sync {
    /// Print a full line.
    fn line(&self, text: &str);

    /// Print a prompt without a trailing newline.
    fn prompt(&self, text: &str);
}

/// Console backed by the process stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn line(&self, text: &str) {
        println!("{}", text);
    }

    fn prompt(&self, text: &str) {
        let mut stdout = io::stdout().lock();
        // Nothing useful can be done if the terminal is gone.
        let _ = write!(stdout, "{}", text);
        let _ = stdout.flush();
    }
}

/// Read the next line, trimmed. `None` at end of input.
pub async fn read_line<R>(input: &mut Lines<R>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    Ok(input.next_line().await?.map(|line| line.trim().to_string()))
}
