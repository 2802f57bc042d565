use std::path::Path;

use onay_core::stages::{RejectRoute, StageDefinition, StageTable};

use crate::commands::{escape_json, exit, load_config, CommandResult};

pub fn run(file: Option<&Path>, json_output: bool) -> CommandResult {
    let table = match file {
        Some(path) => StageTable::load(path),
        None => match load_config("stages") {
            Ok(config) => config.workflow.stage_table(),
            Err(failure) => return failure,
        },
    };

    let table = match table {
        Ok(table) => table,
        Err(error) => {
            return CommandResult::failure(
                "stages",
                "stage_definitions",
                error.to_string(),
                exit::STAGES,
            );
        }
    };

    if json_output {
        let definitions = table.definitions().collect::<Vec<_>>();
        let output = serde_json::to_string_pretty(&definitions).unwrap_or_else(|error| {
            format!(
                "{{\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::raw(0, output);
    }

    let blocks = table.definitions().map(render_definition).collect::<Vec<_>>();
    CommandResult::raw(0, blocks.join("\n\n"))
}

fn render_definition(definition: &StageDefinition) -> String {
    let mut lines = vec![format!(
        "{} (draft `{}`, returned `{}`, approved `{}`)",
        definition.workflow_type,
        definition.draft_status,
        definition.return_status(),
        definition.approved_status
    )];

    for (index, stage) in definition.stages.iter().enumerate() {
        let scope = if stage.scoped { " [scoped]" } else { "" };
        let on_reject = match (stage.on_reject, stage.rejected_status.as_deref()) {
            (RejectRoute::Terminate, Some(rejected)) => format!("reject -> `{rejected}`"),
            (RejectRoute::Terminate, None) => "reject -> <undeclared>".to_string(),
            (RejectRoute::RevisionLoop, _) => {
                format!("reject -> `{}` (revision loop)", definition.draft_status)
            }
        };
        lines.push(format!(
            "  {}. {}{scope}: pending `{}`, approve -> `{}`, {on_reject}",
            index + 1,
            stage.role,
            stage.pending_status,
            definition.approved_status_of(index),
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use onay_core::stages::StageTable;

    use super::render_definition;

    #[test]
    fn budget_chain_renders_every_stage_in_order() {
        let table = StageTable::builtin().expect("builtin");
        let definition = table
            .definitions()
            .find(|definition| definition.workflow_type.as_str() == "budget_proposal")
            .expect("budget proposal");

        let rendered = render_definition(definition);
        let lines = rendered.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("vice_president [scoped]: pending `vp_review`"));
        assert!(lines[1].contains("approve -> `finance_review`"));
        assert!(lines[3].contains("approve -> `approved`"));
        assert!(lines[3].contains("reject -> `president_rejected`"));
    }

    #[test]
    fn revision_loop_stages_point_back_to_draft() {
        let table = StageTable::builtin().expect("builtin");
        let definition = table
            .definitions()
            .find(|definition| definition.workflow_type.as_str() == "activity_report")
            .expect("activity report");

        let rendered = render_definition(definition);

        assert!(rendered.contains("reject -> `draft` (revision loop)"));
        assert!(rendered.contains("approve -> `published`"));
    }
}
