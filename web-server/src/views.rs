//! HTML views
//!
//! Two-column form: numerical fields alternate between columns by schema
//! index, categorical fields sit in their pinned column as radio buttons.

use std::collections::HashMap;
use std::fmt::Write;

use mace_risk_core::{Assessment, FeatureKind, FeatureSchema, FeatureSpec, FormColumn};

/// What the output area shows after a submission
pub enum Outcome {
    Assessed(Assessment),
    Failed(String),
}

const STYLE: &str = "\
body{font-family:sans-serif;max-width:960px;margin:2em auto;color:#222}\
.columns{display:flex;gap:2em}.column{flex:1}\
label.field{display:block;margin:.6em 0 .2em;font-weight:600}\
input[type=number]{width:100%;padding:.3em}\
.output{margin-top:2em;padding:1em;border:1px solid #ccc}\
.error{color:#b00020}.up{color:#ff0051}.down{color:#008bfb}\
img{width:100%;height:auto}table{border-collapse:collapse;margin-top:1em}\
td,th{padding:.2em .8em;text-align:left}td.num{text-align:right}";

pub fn page(
    schema: &FeatureSchema,
    submitted: &HashMap<String, String>,
    outcome: Option<&Outcome>,
) -> String {
    let mut left = String::new();
    let mut right = String::new();
    for (i, spec) in schema.specs.iter().enumerate() {
        let html = field(spec, submitted.get(spec.key).map(String::as_str));
        match schema.form_column(i) {
            Some(FormColumn::Right) => right.push_str(&html),
            _ => left.push_str(&html),
        }
    }

    let output = match outcome {
        Some(outcome) => output(outcome),
        None => String::new(),
    };

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>10-year MACE risk</title><style>{style}</style></head><body>\
         <h1>10-year risk of major adverse cardiac events</h1>\
         <form method=\"post\" action=\"/assess\">\
         <div class=\"columns\"><div class=\"column\">{left}</div><div class=\"column\">{right}</div></div>\
         <p><button type=\"submit\">Predict</button></p></form>{output}</body></html>",
        style = STYLE,
        left = left,
        right = right,
        output = output,
    )
}

fn field(spec: &FeatureSpec, submitted: Option<&str>) -> String {
    let key = escape(spec.key);
    let name = escape(spec.name);

    match spec.kind {
        FeatureKind::Numerical => {
            let value = submitted.unwrap_or("");
            format!(
                "<label class=\"field\" for=\"{key}\">{name}</label>\
                 <input type=\"number\" step=\"any\" id=\"{key}\" name=\"{key}\" value=\"{value}\" placeholder=\"0\">",
                key = key,
                name = name,
                value = escape(value),
            )
        }
        FeatureKind::Categorical { options, .. } => {
            let selected = submitted
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or_else(|| spec.default_value() as i64);

            let mut html = format!("<span class=\"field\"><label class=\"field\">{}</label>", name);
            for option in options {
                let _ = write!(
                    html,
                    "<label><input type=\"radio\" name=\"{key}\" value=\"{code}\"{checked}> {label}</label> ",
                    key = key,
                    code = option.code,
                    checked = if option.code == selected { " checked" } else { "" },
                    label = escape(option.label),
                );
            }
            html.push_str("</span>");
            html
        }
    }
}

fn output(outcome: &Outcome) -> String {
    let assessment = match outcome {
        Outcome::Failed(message) => {
            return format!(
                "<div class=\"output\"><p class=\"error\">{}</p></div>",
                escape(message)
            )
        }
        Outcome::Assessed(assessment) => assessment,
    };

    let mut html = format!(
        "<div class=\"output\"><h2>Predicted 10-year risk: {:.1}%</h2>",
        assessment.prediction.probability * 100.0
    );

    match &assessment.explanation {
        Ok(published) => {
            let agg = &published.aggregated;
            let _ = write!(
                html,
                "<img src=\"/explanations/{}\" alt=\"Feature contributions\" width=\"{}\" height=\"{}\">",
                escape(&published.image.id),
                published.image.width,
                published.image.height
            );
            html.push_str("<table><tr><th>Contributor</th><th>Effect (log-odds)</th></tr>");
            let _ = write!(
                html,
                "<tr><td>Baseline</td><td class=\"num\">{:.4}</td></tr>",
                agg.baseline
            );
            for c in agg.contributors() {
                let class = if c.value > 0.0 {
                    "up"
                } else if c.value < 0.0 {
                    "down"
                } else {
                    ""
                };
                let _ = write!(
                    html,
                    "<tr><td>{}</td><td class=\"num {}\">{:+.4}</td></tr>",
                    escape(&c.feature_name),
                    class,
                    c.value
                );
            }
            let _ = write!(
                html,
                "<tr><th>Model output</th><th class=\"num\">{:.4}</th></tr></table>",
                agg.final_value()
            );
        }
        Err(e) => {
            let _ = write!(
                html,
                "<p class=\"error\">Explanation unavailable: {}</p>",
                escape(&e.to_string())
            );
        }
    }

    html.push_str("</div>");
    html
}

/// Minimal HTML escaping for text and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
