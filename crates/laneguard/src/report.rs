//! Alert formatting: email subject, HTML body, and the operator text draft.

use riskcore::model::DecisionResult;

/// Subject line for an outbound alert.
pub fn alert_subject(decision: &DecisionResult) -> String {
    format!(
        "Laneguard alert: {} risk {}/100",
        decision.route, decision.final_risk
    )
}

/// Concise email-safe HTML for a risk decision.
pub fn format_html_report(decision: &DecisionResult) -> String {
    let action = decision.recommended_action.to_uppercase();
    let color = if action.contains("REROUTE") {
        "#d9534f"
    } else {
        "#f0ad4e"
    };

    let alternatives: String = decision
        .alternatives
        .iter()
        .map(|item| format!("<li>{item}</li>"))
        .collect();

    let cba_html = decision
        .cost_benefit
        .as_ref()
        .map(|cba| {
            format!(
                "<p><b>Cost-Benefit Decision:</b> {}</p><p>{}</p>",
                cba.recommendation, cba.rationale
            )
        })
        .unwrap_or_default();

    format!(
        "<html><body style='font-family:Arial,sans-serif;'>\
         <h2 style='color:{color};'>Route Risk Alert: {route}</h2>\
         <p><b>Risk Score:</b> {risk}/100</p>\
         <p><b>Predicted Delay:</b> {delay} days</p>\
         <p><b>Recommendation:</b> <span style='font-weight:bold'>{action}</span></p>\
         <hr/>\
         <h4>AI Reasoning</h4>\
         <p>{reason}</p>\
         <h4>Alternatives</h4>\
         <ul>{alternatives}</ul>\
         {cba_html}\
         </body></html>",
        route = decision.route,
        risk = decision.final_risk,
        delay = decision.predicted_delay_days,
        reason = decision.reason,
    )
}

/// Operator-friendly plain-text draft printed by the CLI.
pub fn draft_alert_text(decision: &DecisionResult) -> String {
    let alternatives: String = decision
        .alternatives
        .iter()
        .map(|item| format!("- {item}\n"))
        .collect();

    let cba_section = decision
        .cost_benefit
        .as_ref()
        .map(|cba| {
            format!(
                "\nCost-benefit recommendation:\n- Decision: {}\n- Rationale: {}\n",
                cba.recommendation, cba.rationale
            )
        })
        .unwrap_or_default();

    format!(
        "Route: {}\n\
         Final Risk: {}\n\
         Predicted Delay (days): {}\n\
         Confidence: {:.2}\n\n\
         Why this alert:\n{}\n\n\
         Recommended alternatives:\n{}{}",
        decision.route,
        decision.final_risk,
        decision.predicted_delay_days,
        decision.confidence,
        decision.reason,
        alternatives,
        cba_section,
    )
}
