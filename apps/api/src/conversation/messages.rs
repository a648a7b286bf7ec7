//! Reply texts. Every reachable state has a reply for every class of input,
//! so the user is never left without an answer.

pub const CHOOSE_REVIEW_TYPE: &str = "Would you like a Basic (free) or Advanced (paid) review?";

pub const REVIEW_TYPE_UNCLEAR: &str =
    "I didn't understand that. Please type 'Basic' for a free review or 'Advanced' for a paid review.";

pub const UPLOAD_PROMPT: &str = "Please upload your CV (PDF or DOCX, max 5MB). Your CV will be temporarily stored for review and securely deleted within 24 hours.";

pub const PAYMENT_PENDING: &str = "I'll confirm your payment automatically once it's completed. If you've already paid, please wait a moment while I verify the payment.";

pub const ASK_EMAIL: &str = "Your payment has been confirmed. Would you like to receive your advanced review by email as well? If yes, please reply with your email address, or type 'skip' to continue without email.";

pub const EMAIL_SAVED_UPLOAD: &str = "Thanks! Now, please upload your CV (PDF or DOCX, max 5MB).";

pub const EMAIL_SKIPPED: &str = "No problem. Please upload your CV (PDF or DOCX, max 5MB).";

pub const EMAIL_INVALID: &str = "That doesn't look like a valid email address. Please enter a valid email or type 'skip' to continue without email.";

pub const CV_RECEIVED: &str = "Thanks! I've received your CV and will process it shortly.";

pub const ADVANCED_IN_PROGRESS: &str =
    "I'm generating your in-depth CV review. This might take a few moments...";

pub const UNSUPPORTED_FORMAT: &str =
    "Sorry, I can only accept PDF or DOCX files. Please upload your CV in one of these formats.";

pub const FILE_TOO_LARGE: &str =
    "Sorry, that file is larger than 5MB. Please upload a smaller PDF or DOCX version of your CV.";

pub const AWAITING_CV: &str = "I'm waiting for your CV. Please upload a PDF or DOCX file (max 5MB).";

pub const PROCESSING_FAILED: &str =
    "Sorry, there was an error processing your CV. Please try again later.";

pub const UPSELL_DECLINED: &str =
    "Thank you for using our CV review service. Feel free to contact us anytime for a new review.";

pub const GREETING_PROMPT: &str =
    "Hello! I'm your CV review assistant. Send 'Review CV' to get started.";

pub const PAYMENT_RECEIVED_PROCESSING: &str = "Thank you for your payment! I will now process your CV for an advanced review. This will take just a moment...";

pub const PAYMENT_RECEIVED_UPLOAD: &str = "Thank you for your payment! Please upload your CV (PDF or DOCX, max 5MB) to receive your advanced review.";

pub fn payment_link(link: &str) -> String {
    format!("To proceed with an Advanced review, please complete the payment via this link: {link}")
}

pub fn upsell_payment_link(link: &str) -> String {
    format!("Great! To proceed with an Advanced review, please complete the payment via this link: {link}")
}

pub fn email_recorded(email: &str) -> String {
    format!(
        "Thank you! Your advanced review will be sent to {email}. Now, please upload your CV (PDF or DOCX, max 5MB)."
    )
}

fn bulleted(insights: &[String]) -> String {
    insights
        .iter()
        .map(|insight| format!("• {insight}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn basic_review(insights: &[String]) -> String {
    format!(
        "Here's your basic CV review:\n\n{}\n\nWould you like to unlock deeper insights? Reply 'Advanced' to proceed to payment.",
        bulleted(insights)
    )
}

pub fn advanced_review(
    score: u8,
    insights: &[String],
    report_link: Option<&str>,
    emailed_to: Option<&str>,
) -> String {
    let mut reply = format!(
        "Here's your advanced CV review (Score: {score}/100):\n\n{}",
        bulleted(insights)
    );
    if let Some(link) = report_link {
        reply.push_str(&format!("\n\nDownload full report: {link}"));
    }
    if let Some(email) = emailed_to {
        reply.push_str(&format!(
            "\n\nA copy of this review has also been sent to your email ({email})."
        ));
    }
    reply
}
