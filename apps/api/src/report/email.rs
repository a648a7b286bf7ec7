//! Email bodies for an advanced review. Plain functions over the finished
//! review so the pipeline can hand the result straight to the mailer.

use crate::models::review::ReviewResult;

pub const SUBJECT: &str = "Your CV Review Report";
pub const ATTACHMENT_NAME: &str = "cv-review-report.pdf";

/// Insights shown inline; the rest are left to the attached report.
const INLINE_INSIGHTS: usize = 5;
const LINK_EXPIRY_NOTE: &str = "This download link expires in 7 days.";

const NEXT_STEPS: [&str; 3] = [
    "Review the full report attached to this email.",
    "Update your CV starting with the highest-impact insights.",
    "Send the revised CV on WhatsApp for a follow-up review.",
];

fn inline_insights(review: &ReviewResult) -> (&[String], bool) {
    let shown = review.insights.len().min(INLINE_INSIGHTS);
    (&review.insights[..shown], review.insights.len() > INLINE_INSIGHTS)
}

pub fn render_text(review: &ReviewResult, report_url: &str) -> String {
    let (insights, truncated) = inline_insights(review);
    let mut body = format!(
        "Hello,\n\nYour advanced CV review is complete.\n\nCV Improvement Score: {}/100\n\nKey insights:\n",
        review.improvement_score
    );
    for insight in insights {
        body.push_str(&format!("- {insight}\n"));
    }
    if truncated {
        body.push_str("...and more insights in your full report!\n");
    }
    body.push_str(&format!(
        "\nDownload your full report: {report_url}\n{LINK_EXPIRY_NOTE}\n\nNext steps:\n"
    ));
    for (i, step) in NEXT_STEPS.iter().enumerate() {
        body.push_str(&format!("{}. {step}\n", i + 1));
    }
    body.push_str("\nThank you for using our CV review service.\n");
    body
}

pub fn render_html(review: &ReviewResult, report_url: &str) -> String {
    let (insights, truncated) = inline_insights(review);
    let items: String = insights
        .iter()
        .map(|i| format!("<li>{}</li>", escape_html(i)))
        .collect();
    let more = if truncated {
        "<p><em>...and more insights in your full report!</em></p>"
    } else {
        ""
    };
    let steps: String = NEXT_STEPS.iter().map(|s| format!("<li>{s}</li>")).collect();
    let url = escape_html(report_url);

    format!(
        r##"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #333; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #2c3e50;">Your CV Review Report</h1>
  <p>Your advanced CV review is complete.</p>
  <p style="font-size: 18px;"><strong>CV Improvement Score: {score}/100</strong></p>
  <h2>Key insights</h2>
  <ul>{items}</ul>
  {more}
  <p><a href="{url}" style="background: #4CAF50; color: #fff; padding: 10px 18px; text-decoration: none; border-radius: 4px;">Download full report</a></p>
  <p style="font-size: 12px; color: #777;">{LINK_EXPIRY_NOTE}</p>
  <h2>Next steps</h2>
  <ol>{steps}</ol>
  <p>Thank you for using our CV review service.</p>
</body>
</html>"##,
        score = review.improvement_score,
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::scoring::ScoringProvider;
    use crate::models::cv::CvMetrics;
    use crate::models::session::ReviewType;
    use chrono::Utc;

    fn review(insight_count: usize) -> ReviewResult {
        ReviewResult {
            identity: "2348012345678".into(),
            review_type: ReviewType::Advanced,
            cv_file_name: "cv.pdf".into(),
            timestamp: Utc::now(),
            improvement_score: 68,
            insights: (1..=insight_count).map(|i| format!("Insight {i}")).collect(),
            detected_sections: vec![],
            metrics: CvMetrics::default(),
            provider: ScoringProvider::LocalFallback,
            report_ref: None,
            email_sent: None,
        }
    }

    #[test]
    fn test_text_body_truncates_after_five_insights() {
        let body = render_text(&review(7), "https://files.example.com/r.pdf");
        assert!(body.contains("68/100"));
        assert!(body.contains("- Insight 5"));
        assert!(!body.contains("Insight 6"));
        assert!(body.contains("...and more insights in your full report!"));
        assert!(body.contains("https://files.example.com/r.pdf"));
        assert!(body.contains("expires in 7 days"));
    }

    #[test]
    fn test_short_lists_have_no_more_note() {
        let body = render_html(&review(3), "https://files.example.com/r.pdf");
        assert!(body.contains("<li>Insight 3</li>"));
        assert!(!body.contains("and more insights"));
    }

    #[test]
    fn test_html_escapes_link_and_insights() {
        let mut r = review(1);
        r.insights = vec!["Use <b>bold</b> sparingly".into()];
        let body = render_html(&r, "https://x.example.com/r.pdf?a=1&b=2");
        assert!(body.contains("Use &lt;b&gt;bold&lt;/b&gt; sparingly"));
        assert!(body.contains("a=1&amp;b=2"));
    }
}
