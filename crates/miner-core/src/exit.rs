// SPDX-License-Identifier: CEPL-1.0
//! Process exit policy: a clean shutdown exits 0, any fatal error exits 1
//! after its message (and cause chain) is written to stderr.

use std::process::ExitCode;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FATAL: u8 = 1;

pub fn exit_status(result: &anyhow::Result<()>) -> u8 {
    match result {
        Ok(()) => EXIT_OK,
        Err(_) => EXIT_FATAL,
    }
}

/// Formats an error and every cause beneath it, one per line.
pub fn describe(err: &anyhow::Error) -> String {
    let mut out = err.to_string();
    for cause in err.chain().skip(1) {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
    }
    out
}

pub fn report(result: anyhow::Result<()>) -> ExitCode {
    let status = exit_status(&result);
    if let Err(err) = &result {
        tracing::error!("fatal: {err:#}");
        eprintln!("{}", describe(err));
    }
    ExitCode::from(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn clean_shutdown_exits_zero() {
        assert_eq!(exit_status(&Ok(())), EXIT_OK);
    }

    #[test]
    fn fatal_error_exits_one() {
        assert_eq!(exit_status(&Err(anyhow!("device lost"))), EXIT_FATAL);
    }

    #[test]
    fn describe_lists_cause_chain() {
        let err = Err::<(), _>(anyhow!("vkCreateDevice failed"))
            .context("logical device")
            .unwrap_err();
        let text = describe(&err);
        assert!(text.starts_with("logical device"));
        assert!(text.contains("caused by: vkCreateDevice failed"));
    }
}
