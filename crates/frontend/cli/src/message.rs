//! Terminal confirmation prompts

use std::io::{self, BufRead, Write};

/// Button set offered by a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buttons {
    Ok,
    OkCancel,
    YesNo,
    YesNoCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ok,
    Cancel,
    Yes,
    No,
}

impl Buttons {
    /// Answer assumed when the prompt is closed or the reply is not understood
    pub fn default_response(self) -> Response {
        match self {
            Buttons::Ok => Response::Ok,
            Buttons::OkCancel => Response::Cancel,
            Buttons::YesNo => Response::No,
            Buttons::YesNoCancel => Response::Cancel,
        }
    }

    pub fn accepts(self, response: Response) -> bool {
        match self {
            Buttons::Ok => response == Response::Ok,
            Buttons::OkCancel => matches!(response, Response::Ok | Response::Cancel),
            Buttons::YesNo => matches!(response, Response::Yes | Response::No),
            Buttons::YesNoCancel => {
                matches!(response, Response::Yes | Response::No | Response::Cancel)
            }
        }
    }

    /// A valid answer is returned as is; anything else falls back to the default.
    pub fn resolve(self, answer: Option<Response>) -> Response {
        match answer {
            Some(response) if self.accepts(response) => response,
            _ => self.default_response(),
        }
    }

    fn choices(self) -> &'static str {
        match self {
            Buttons::Ok => "[ok]",
            Buttons::OkCancel => "[ok/cancel]",
            Buttons::YesNo => "[yes/no]",
            Buttons::YesNoCancel => "[yes/no/cancel]",
        }
    }
}

pub fn parse_response(input: &str) -> Option<Response> {
    match input.trim().to_lowercase().as_str() {
        "o" | "ok" => Some(Response::Ok),
        "c" | "cancel" => Some(Response::Cancel),
        "y" | "yes" => Some(Response::Yes),
        "n" | "no" => Some(Response::No),
        _ => None,
    }
}

/// Ask `question` and read one line of reply. End of input counts as closing the prompt.
pub fn ask<R: BufRead, W: Write>(
    buttons: Buttons,
    question: &str,
    input: &mut R,
    output: &mut W,
) -> io::Result<Response> {
    write!(output, "{} {} ", question, buttons.choices())?;
    output.flush()?;

    let mut line = String::new();
    let answer = match input.read_line(&mut line)? {
        0 => None,
        _ => parse_response(&line),
    };
    Ok(buttons.resolve(answer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_prompt_defaults() {
        assert_eq!(Buttons::Ok.resolve(None), Response::Ok);
        assert_eq!(Buttons::OkCancel.resolve(None), Response::Cancel);
        assert_eq!(Buttons::YesNo.resolve(None), Response::No);
        assert_eq!(Buttons::YesNoCancel.resolve(None), Response::Cancel);
    }

    #[test]
    fn test_out_of_set_answer_defaults() {
        assert_eq!(Buttons::OkCancel.resolve(Some(Response::Yes)), Response::Cancel);
        assert_eq!(Buttons::YesNo.resolve(Some(Response::Ok)), Response::No);
        assert_eq!(Buttons::Ok.resolve(Some(Response::Cancel)), Response::Ok);
        assert_eq!(Buttons::YesNoCancel.resolve(Some(Response::Yes)), Response::Yes);
    }

    #[test]
    fn test_ask_reads_reply() {
        let mut out = Vec::new();
        let response = ask(Buttons::OkCancel, "Overwrite?", &mut &b"ok\n"[..], &mut out).unwrap();
        assert_eq!(response, Response::Ok);
        assert_eq!(String::from_utf8(out).unwrap(), "Overwrite? [ok/cancel] ");

        let response = ask(Buttons::OkCancel, "Overwrite?", &mut &b"maybe\n"[..], &mut Vec::new());
        assert_eq!(response.unwrap(), Response::Cancel);

        let response = ask(Buttons::YesNo, "Continue?", &mut &b""[..], &mut Vec::new());
        assert_eq!(response.unwrap(), Response::No);
    }
}
