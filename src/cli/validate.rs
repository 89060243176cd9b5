use anyhow::{Result, bail};
use console::style;

use crate::core::index::build_server_infos;
use crate::core::parser::{DefinitionParser, XmlDefParser};

/// One-shot parse + index of a definitions file, for checking an export
/// before pointing the server at it. Fails with the same error taxonomy
/// a refresh would record.
pub(crate) fn run(args: &[String]) -> Result<()> {
    let Some(path) = args.get(2) else {
        bail!("usage: ctmview validate <file>");
    };

    let parser = XmlDefParser::new(path);
    let table = parser.parse()?;
    let smart_count = table.items.iter().filter(|item| item.is_smart()).count();
    let servers = build_server_infos(&table)?;

    let folder_count: usize = servers.values().map(|server| server.folders.len()).sum();
    let job_count: usize = servers
        .values()
        .flat_map(|server| &server.folders)
        .map(|folder| folder.jobs.len())
        .sum();

    println!(
        "{} {} parsed: {} servers, {} folders ({} smart), {} jobs",
        style("ok").green().bold(),
        path,
        servers.len(),
        folder_count,
        smart_count,
        job_count
    );
    for server in servers.values() {
        println!(
            "   {}  folders={} nodes={} applications={}",
            style(&server.name).cyan(),
            server.folders.len(),
            server.nodes.len(),
            server.application_keys.len()
        );
    }
    Ok(())
}
