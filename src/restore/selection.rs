// dbbackup/src/restore/selection.rs
use std::fmt::Write as _;
use std::io::{BufRead, Write};

use crate::artifact::Location;
use crate::errors::{BackupError, Result};
use crate::storage::catalog::Catalog;

/// The backup chosen for a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub location: Location,
    pub identifier: String,
}

/// Resolves an operator token against the catalog.
///
/// * `N`  - the N-th local backup (1-based, newest first)
/// * `rN` - the N-th remote backup
/// * empty - the most recent local backup
///
/// Anything else, or an index past the end of the list, is an
/// `InvalidSelection`; there is no fallback.
pub fn select(catalog: &Catalog, token: &str) -> Result<Selection> {
    let token = token.trim();
    if token.is_empty() {
        return catalog
            .local
            .first()
            .map(|name| Selection {
                location: Location::Local,
                identifier: name.clone(),
            })
            .ok_or_else(|| {
                BackupError::InvalidSelection("no local backups available for the default choice".to_string())
            });
    }

    let (location, candidates, digits) = match token.strip_prefix(['r', 'R']) {
        Some(rest) => (Location::Remote, &catalog.remote, rest),
        None => (Location::Local, &catalog.local, token),
    };

    let index: usize = digits
        .parse()
        .map_err(|_| BackupError::InvalidSelection(format!("{:?} is not a backup number", token)))?;
    if index == 0 || index > candidates.len() {
        return Err(BackupError::InvalidSelection(format!(
            "{} is out of range: {} {} backup(s) available",
            token,
            candidates.len(),
            location
        )));
    }

    Ok(Selection {
        location,
        identifier: candidates[index - 1].clone(),
    })
}

/// Numbered listing shown before the prompt.
pub fn render_menu(catalog: &Catalog) -> String {
    let mut menu = String::new();
    if catalog.local.is_empty() {
        menu.push_str("\nNo local backups.\n");
    } else {
        menu.push_str("\nAvailable local backups:\n");
        for (idx, name) in catalog.local.iter().enumerate() {
            let _ = writeln!(menu, "{}. {}", idx + 1, name);
        }
    }
    if !catalog.remote.is_empty() {
        menu.push_str("\nAvailable remote backups:\n");
        for (idx, name) in catalog.remote.iter().enumerate() {
            let _ = writeln!(menu, "r{}. {}", idx + 1, name);
        }
    }
    menu
}

/// Prompts until a valid choice is made. Each invalid answer goes back to the
/// listing. End of input or `q` abandons the restore.
pub fn prompt_selection<R, W>(catalog: &Catalog, input: &mut R, output: &mut W) -> Result<Selection>
where
    R: BufRead,
    W: Write,
{
    let io_err = |e: std::io::Error| BackupError::InvalidSelection(format!("failed to read selection: {}", e));

    loop {
        write!(
            output,
            "{}\nEnter the backup number to restore (rN for remote, Enter for latest local, q to quit): ",
            render_menu(catalog)
        )
        .map_err(io_err)?;
        output.flush().map_err(io_err)?;

        let mut line = String::new();
        if input.read_line(&mut line).map_err(io_err)? == 0 {
            return Err(BackupError::InvalidSelection("no selection made".to_string()));
        }
        if line.trim().eq_ignore_ascii_case("q") {
            return Err(BackupError::InvalidSelection("restore cancelled by operator".to_string()));
        }

        match select(catalog, &line) {
            Ok(selection) => return Ok(selection),
            Err(e) => {
                writeln!(output, "❌ {}", e).map_err(io_err)?;
            }
        }
    }
}
