use std::io::{self, BufRead, Write};

/// Asks the operator to approve a destructive action
pub trait Confirm {
    /// Return `true` if the action described by `message` may proceed
    fn confirm(&mut self, message: &str) -> bool;
}

/// Prompts on stderr and reads the answer from stdin; only `yes` approves
#[derive(Debug, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, message: &str) -> bool {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "{message} Type 'yes' to continue: ");
        let _ = stderr.flush();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_approval(&answer),
            Err(_) => false,
        }
    }
}

/// Approves everything, used for `--force`
#[derive(Debug, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _message: &str) -> bool {
        true
    }
}

/// Check if an answer typed at the prompt approves the action
pub fn is_approval(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}
