//! Role prompts and transcript builders

use serde_json::{json, Value};

use ndrill_provider::Message;

use crate::scanner::ScanStep;

const JSON_RULES: &str = "### CRITICAL JSON RULES:
1. JSON ONLY: output a single JSON object. Put your reasoning in \"thought\".
2. NO PLACEHOLDERS: never use `...` or `target.com`. Use the ACTUAL target.
3. VALID SYNTAX: double-quote every key and string. Escape newlines.";

pub fn recon_system(mission: &str) -> String {
    format!(
        "You are the Reconnaissance Agent.

{JSON_RULES}

### MISSION: {mission}

### Tools: curl, nmap

### JSON Structure:
{{
    \"thought\": \"Reasoning...\",
    \"tool_name\": \"nmap\",
    \"args\": [\"-sV\", \"TARGET\"]
}}"
    )
}

pub fn scanner_system() -> String {
    format!(
        "You are the Scanner Agent, an automated security analyst.
Your goal is to find actionable vulnerabilities using fast, non-interactive tools.

{JSON_RULES}

### CONSTRAINTS:
- NO DOS: never use slowhttptest or hping3.
- SPEED: prefer `sqlmap --batch`, `ffuf`, `commix --batch`.
- NIKTO: only as a last resort.

### Available Tools:
- sqlmap: `sqlmap -u \"<URL>\" --batch`
- ffuf: `ffuf -u <URL>/FUZZ -w /usr/share/dirb/wordlists/common.txt`
- commix: `commix --url=\"<URL>\" --batch`
- wfuzz: `wfuzz -c -z file,/usr/share/dirb/wordlists/common.txt --hc 404 <URL>/FUZZ`
- nikto: `nikto -host <URL>`

### JSON Structure:
{{
    \"thought\": \"Reasoning here...\",
    \"tool_name\": \"tool\",
    \"args\": [\"arg1\", \"arg2\"],
    \"is_satisfied\": false
}}"
    )
}

pub fn exploit_system(mission: &str) -> String {
    format!(
        "You are the Exploitation Agent of an authorized security assessment.
Write a self-contained Python 3 script that verifies the most promising finding.

{JSON_RULES}

### MISSION: {mission}

### RULES:
- Standard library only; the script runs non-interactively with `python3`.
- Print clear evidence of the result to stdout.
- Set \"is_goal_achieved\" to true only when the output proves the objective.

### JSON Structure:
{{
    \"thought\": \"Reasoning...\",
    \"exploit_script\": \"import urllib.request\\nprint(...)\",
    \"is_goal_achieved\": false
}}"
    )
}

pub fn recon_transcript(mission: &str, target: &str) -> Vec<Message> {
    vec![
        Message::system(recon_system(mission)),
        Message::user(format!("TARGET: {}\nMISSION: {}", target, mission)),
    ]
}

pub fn recon_report_request(output: &str) -> String {
    format!("DATA: {}. Synthesize report.", output)
}

pub fn scanner_transcript(
    mission: &str,
    target: &str,
    context: &Value,
    history: &[ScanStep],
) -> Vec<Message> {
    vec![
        Message::system(scanner_system()),
        Message::user(format!(
            "TARGET: {}\nCONTEXT: {}\nHISTORY: {}\nMISSION: {}\n\nOUTPUT NEXT TOOL IN JSON.",
            target,
            context,
            json!(history),
            mission
        )),
    ]
}

pub fn scan_report_request(history: &[ScanStep]) -> String {
    format!(
        "Intel: {}. Generate FINAL SCAN REPORT JSON.",
        json!(history)
    )
}

pub fn exploit_transcript(
    mission: &str,
    target: &str,
    scan_report: &Value,
    knowledge: &Value,
) -> Vec<Message> {
    vec![
        Message::system(exploit_system(mission)),
        Message::user(format!(
            "TARGET: {}\nSCAN REPORT: {}\nKNOWLEDGE: {}\nMISSION: {}\n\nOUTPUT THE ASSESSMENT SCRIPT IN JSON.",
            target, scan_report, knowledge, mission
        )),
    ]
}

/// Sent when a decision carries an `error` field instead of a payload
pub fn decision_error_feedback(error: &str) -> String {
    format!("SYSTEM: Fix JSON. Error: {}. Ensure keys are quoted.", error)
}

pub const MISSING_SCRIPT_REMINDER: &str = "You must provide an 'exploit_script' in your JSON.";
