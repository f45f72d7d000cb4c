//! HTML layouts for transactional mail.

/// Subject line of verification-code mail.
pub const OTP_SUBJECT: &str = "Your OTP Verification Code";

/// Minutes a verification code stays valid.
pub const OTP_VALID_MINUTES: u32 = 10;

/// Renders the verification-code email.
#[must_use]
pub fn otp(code: &str, product: &str) -> String {
    let code = escape_html(code);
    let product = escape_html(product);
    format!(
        "<html>
<body style='font-family: Arial, sans-serif; line-height: 1.6; color: #333;'>
  <div style='max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #ddd; border-radius: 5px;'>
    <h1 style='color: #4a6ee0;'>Your Verification Code</h1>
    <p>Thank you for registering with {product}. Please use the following code to verify your email address:</p>
    <div style='background-color: #f5f5f5; padding: 15px; text-align: center; font-size: 24px; font-weight: bold; letter-spacing: 5px; margin: 20px 0;'>
      {code}
    </div>
    <p>This code will expire in {OTP_VALID_MINUTES} minutes.</p>
    <p>If you didn't request this code, please ignore this email.</p>
    <hr style='border: none; border-top: 1px solid #ddd; margin: 20px 0;'>
    <p style='font-size: 12px; color: #777;'>This is an automated message, please do not reply to this email.</p>
  </div>
</body>
</html>
"
    )
}

/// Renders a notification inside the standard frame.
///
/// `content_html` is inserted as-is; `subject` and `product` are escaped.
#[must_use]
pub fn notification(subject: &str, content_html: &str, product: &str, year: i32) -> String {
    let subject = escape_html(subject);
    let product = escape_html(product);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{subject}</title>
  <style>
    body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; margin: 0; padding: 0; }}
    .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
    .header {{ background-color: #4f46e5; color: white; padding: 20px; text-align: center; }}
    .content {{ padding: 20px; background-color: #f9fafb; }}
    .footer {{ text-align: center; padding: 20px; font-size: 12px; color: #6b7280; }}
  </style>
</head>
<body>
  <div class="container">
    <div class="header">
      <h1>{subject}</h1>
    </div>
    <div class="content">
      {content_html}
    </div>
    <div class="footer">
      <p>&copy; {year} {product}. All rights reserved.</p>
      <p>This email was sent to you because you are a registered user of our service.</p>
    </div>
  </div>
</body>
</html>
"#
    )
}

/// Escapes text for inclusion in HTML element content or attributes.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
