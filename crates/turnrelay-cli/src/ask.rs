//! `turnrelay ask` - interactive terminal client
//!
//! Streams a turn to stdout and, when the agent asks a question, collects
//! the answers on stdin and continues the session.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use turnrelay_core::events::{AgentEvent, EventStream, Question, QuestionSet, StreamOutcome};
use turnrelay_core::gate::{AnswerSheet, GateDecision, GateError, TurnGate, TurnPhase};
use turnrelay_core::{RelayClient, RelayConfig, StartRequest};

type Input = Lines<BufReader<Stdin>>;

pub async fn run(
    config: RelayConfig,
    prompt: String,
    project_id: Option<String>,
    project_path: Option<String>,
) -> Result<()> {
    let client = RelayClient::from_config(&config.client);
    let mut gate = TurnGate::new();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    gate.begin_prompt()?;
    let request = StartRequest {
        prompt: Some(prompt),
        project_id,
        project_path,
        ..Default::default()
    };
    let mut opened = client.start(&request).await;

    loop {
        match opened {
            Ok(stream) => consume(&mut gate, stream).await,
            Err(err) => gate.fail(err),
        }

        match gate.phase() {
            TurnPhase::WaitingForAnswer => {
                if let Some(err) = gate.last_error() {
                    eprintln!("\n✗ {}", err);
                }
                let Some(set) = gate.pending_question().cloned() else {
                    break;
                };
                let Some(sheet) = collect_answers(&set, &mut input).await? else {
                    println!("\nNo answer given; the question stays pending.");
                    return Ok(());
                };
                let request = match gate.begin_answer(&sheet) {
                    Ok(request) => request,
                    Err(GateError::MissingSessionId) => {
                        anyhow::bail!("The agent never reported a session id, cannot continue")
                    }
                    Err(e) => return Err(e.into()),
                };
                opened = client.resume(&request).await;
            }
            TurnPhase::Failed => {
                if let Some(err) = gate.last_error() {
                    eprintln!("\n✗ {}", err);
                    if err.kind.is_recoverable() {
                        eprintln!("  This may succeed if you retry.");
                    }
                }
                break;
            }
            phase => {
                info!("Turn ended: {}", phase);
                println!();
                if let Some(plan_id) = gate.plan_id() {
                    println!("✓ Plan {}", plan_id);
                }
                break;
            }
        }
    }
    Ok(())
}

async fn consume(gate: &mut TurnGate, mut stream: EventStream) {
    while let Some(event) = stream.next_event().await {
        if gate.observe(&event) == GateDecision::Drop {
            continue;
        }
        render(&event);
    }
    if let StreamOutcome::Failed(err) = stream.outcome() {
        if gate.phase() != TurnPhase::Failed {
            gate.fail(err);
        }
    }
    gate.end_stream();
}

fn render(event: &AgentEvent) {
    let mut stdout = std::io::stdout();
    match event {
        AgentEvent::PlanCreated(created) => {
            println!("Plan: {} ({})\n", created.name, created.plan_id);
        }
        AgentEvent::Text(text) => {
            print!("{}", text.content);
        }
        AgentEvent::Result(result) if !result.content.is_empty() => {
            print!("{}", result.content);
        }
        AgentEvent::Tool(tool) => {
            println!("\n  ⚙ {}", tool.name);
        }
        AgentEvent::GitSync(sync) => {
            if let Some(branch) = &sync.branch {
                println!("\n  ⎇ synced {}", branch);
            }
        }
        _ => {}
    }
    if let Err(e) = stdout.flush() {
        warn!("Failed to flush stdout: {}", e);
    }
}

/// Ask every question in turn; `None` when stdin closes
async fn collect_answers(set: &QuestionSet, input: &mut Input) -> Result<Option<AnswerSheet>> {
    let mut sheet = AnswerSheet::new(set);

    for (index, question) in set.questions.iter().enumerate() {
        print_question(question);
        while !sheet.is_answered(index) {
            print!("> ");
            std::io::stdout().flush()?;
            let Some(line) = input.next_line().await? else {
                return Ok(None);
            };
            if let Err(e) = apply_line(&mut sheet, index, question, &line) {
                println!("  {}", e);
            }
        }
    }
    Ok(Some(sheet))
}

fn print_question(question: &Question) {
    println!("\n? {}", question.text);
    for (i, option) in question.options.iter().enumerate() {
        match &option.description {
            Some(description) => println!("  {}) {} - {}", i + 1, option.label, description),
            None => println!("  {}) {}", i + 1, option.label),
        }
    }
    if question.multi_select {
        println!("  (pick one or more, e.g. 1,3)");
    }
}

/// Apply one line of input to question `index`
///
/// Numbers pick options; anything else is a typed answer. Multi-select
/// questions take a comma-separated list of option numbers.
fn apply_line(
    sheet: &mut AnswerSheet,
    index: usize,
    question: &Question,
    line: &str,
) -> Result<(), String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    if question.multi_select {
        let mut labels = Vec::new();
        for part in line.split(',') {
            let label = option_label(question, part.trim())
                .ok_or_else(|| format!("'{}' is not an option number", part.trim()))?;
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        sheet.clear(index);
        for label in labels {
            sheet.toggle(index, label).map_err(|e| e.to_string())?;
        }
        return Ok(());
    }

    let answer = option_label(question, line).unwrap_or(line);
    sheet.select(index, answer).map_err(|e| e.to_string())
}

fn option_label<'a>(question: &'a Question, choice: &str) -> Option<&'a str> {
    let number: usize = choice.parse().ok()?;
    question
        .options
        .get(number.checked_sub(1)?)
        .map(|option| option.label.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnrelay_core::events::QuestionOption;

    fn question(multi_select: bool) -> Question {
        Question {
            text: "Which parts?".into(),
            header: None,
            options: ["A", "B", "C"]
                .iter()
                .map(|label| QuestionOption {
                    label: label.to_string(),
                    description: None,
                })
                .collect(),
            multi_select,
        }
    }

    fn sheet_for(question: &Question) -> AnswerSheet {
        AnswerSheet::new(&QuestionSet {
            tool_use_id: "q1".into(),
            questions: vec![question.clone()],
        })
    }

    #[test]
    fn test_multi_select_numbers() {
        let q = question(true);
        let mut sheet = sheet_for(&q);
        apply_line(&mut sheet, 0, &q, "3, 1").unwrap();
        assert_eq!(sheet.serialize().unwrap(), "A, C");
    }

    #[test]
    fn test_multi_select_rejects_text() {
        let q = question(true);
        let mut sheet = sheet_for(&q);
        assert!(apply_line(&mut sheet, 0, &q, "A").is_err());
        assert!(!sheet.is_answered(0));
    }

    #[test]
    fn test_single_select_number_or_text() {
        let q = question(false);
        let mut sheet = sheet_for(&q);
        apply_line(&mut sheet, 0, &q, "2").unwrap();
        assert_eq!(sheet.serialize().unwrap(), "B");

        apply_line(&mut sheet, 0, &q, "something else").unwrap();
        assert_eq!(sheet.serialize().unwrap(), "something else");
    }

    #[test]
    fn test_blank_line_leaves_question_open() {
        let q = question(false);
        let mut sheet = sheet_for(&q);
        apply_line(&mut sheet, 0, &q, "   ").unwrap();
        assert!(!sheet.is_answered(0));
    }
}
