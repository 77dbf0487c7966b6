use std::io::{self, BufRead, Write};

/// Invalid answers tolerated before giving up
pub const MAX_ATTEMPTS: usize = 3;

/// Ask a yes/no question on `output` and read answers from `input`.
///
/// Accepts `y`/`yes` and `n`/`no` in any case. End of input, or
/// [`MAX_ATTEMPTS`] unrecognized answers, count as no.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<bool> {
    write!(output, "{} (y/N) ", question)?;
    output.flush()?;

    for attempt in 1..=MAX_ATTEMPTS {
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(false);
        }

        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {}
        }

        if attempt < MAX_ATTEMPTS {
            write!(output, "Please type yes or no and then press enter: ")?;
            output.flush()?;
        }
    }

    writeln!(output, "No valid answer after {} attempts.", MAX_ATTEMPTS)?;
    Ok(false)
}
