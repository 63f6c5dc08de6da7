//! Fixed replies for intents that never reach the generation service, plus
//! the fallbacks used when generation is unavailable.

use shopdesk_core::domain::intent::IntentKind;

pub const ORDER_FALLBACK: &str = "I can't track your order right now. Could you share your order ID or make sure you are logged in?";
pub const PRODUCT_FALLBACK: &str = "I can help you find products in our clothing store! What specific items are you looking for?";
pub const POLICY_FALLBACK: &str = "I don't have specific policy information on this topic. Contact our support team for detailed assistance.";
pub const NO_PRODUCTS_FOUND: &str = "No products found matching your search.";

type KeywordReply = (&'static [&'static str], &'static str);

const CHITCHAT_REPLIES: [KeywordReply; 8] = [
    (
        &["hello", "hi", "hey"],
        "Hello! I'm {name}, your clothing store support specialist. How can I assist you with returns, orders, or product information today?",
    ),
    (
        &["how are you", "how's it going"],
        "I'm doing well, thank you for asking! I'm here to help you with any questions about our store. What can I assist you with today?",
    ),
    (
        &["name", "who are you", "introduce yourself"],
        "I'm {name}, your dedicated customer support specialist at our clothing store. I'm here to help you with orders, returns, and any other questions you might have!",
    ),
    (&["thank", "thanks"], "You're welcome! Is there anything else I can help you with today?"),
    (
        &["help", "what can you"],
        "I can help you track orders, search products, check return policies, and answer questions about our clothing store. What would you like assistance with?",
    ),
    (
        &["hours", "open", "close"],
        "Our customer support is available 24/7 for online assistance! For specific store hours, please check our website location details.",
    ),
    (
        &["contact", "phone", "email"],
        "I'm your digital assistant {name}! For complex issues you can also email support@store.com. What can I help you with today?",
    ),
    (
        &["who created you"],
        "I was created by the store team to help you shop smarter, faster, and easier!",
    ),
];

const CHITCHAT_DEFAULT: &str =
    "Hello! I'm {name} from customer support. How can I assist you with our clothing store today?";

const COMPLAINT_REPLIES: [KeywordReply; 6] = [
    (
        &["late", "delayed", "waiting"],
        "I understand your order is delayed and apologize for the inconvenience. Could you share your order ID so I can check the current status and provide an updated delivery estimate?",
    ),
    (
        &["broken", "damaged", "defective"],
        "I'm sorry to hear the item arrived damaged. We'll gladly replace it or process a refund. Please share your order details and photos if possible.",
    ),
    (
        &["wrong", "incorrect", "not what"],
        "I apologize that you received the wrong item. I can help you get the correct product. Could you provide your order ID and let me know what you received vs. what you ordered?",
    ),
    (
        &["order", "delivery", "shipping", "unhappy"],
        "I understand you're having issues with your order. I'd be happy to help resolve this. Could you please provide your order ID or email address so I can look into this for you?",
    ),
    (
        &["return", "refund"],
        "I'm sorry to hear you're having issues with a return. Our return policy allows returns within 30 days. Please share your order details and I'll help you get this sorted out.",
    ),
    (
        &["product", "item", "quality"],
        "I apologize for any issues with our products. Could you please share more details about the problem? I'll do my best to help resolve this for you.",
    ),
];

const REFUND_NOT_PROCESSED: &str = "I understand your return or refund hasn't been processed as expected. Please share your order ID and I'll investigate the status immediately.";

const COMPLAINT_DEFAULT: &str = "I'm sorry you're experiencing issues. To help you best, could you share your order ID and specific details about what went wrong?";

const OFF_TOPIC_REPLY: &str = "I'm {name}, your support assistant, here to help with clothing store questions like orders, returns, products, and policies. Is there anything I can assist you with regarding our store?";

const VIOLATION_REPLY: &str = "I'm here to provide helpful and professional support. If you're experiencing any issues, I'd be happy to help resolve them. Could you please let me know how I can assist you today?";

const GENERIC_REPLIES: [KeywordReply; 3] = [
    (
        &["order", "track"],
        "I'd be happy to help you track your order! Could you please provide your order ID or ensure you are logged in?",
    ),
    (&["search", "find"], PRODUCT_FALLBACK),
    (&["policy", "return"], "No worries, I'm here to help. Let's try that again."),
];

const GENERIC_DEFAULT: &str =
    "Hello! I'm {name}, your clothing store support specialist. How can I assist you today?";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CannedReplies {
    assistant_name: String,
}

impl CannedReplies {
    pub fn new(assistant_name: impl Into<String>) -> Self {
        Self { assistant_name: assistant_name.into() }
    }

    /// Reply for intents answered without generation.
    pub fn direct(&self, intent: IntentKind, text: &str) -> String {
        let input = text.to_lowercase();
        match intent {
            IntentKind::Chitchat => self.render(pick(&CHITCHAT_REPLIES, &input, CHITCHAT_DEFAULT)),
            IntentKind::Complaint => self.render(complaint_reply(&input)),
            IntentKind::OffTopic => self.render(OFF_TOPIC_REPLY),
            IntentKind::Violation => self.render(VIOLATION_REPLY),
            _ => self.generic(&input),
        }
    }

    /// Reply used when a generation-backed answer cannot be produced.
    pub fn fallback(&self, intent: IntentKind, text: &str) -> String {
        match intent {
            IntentKind::OrderStatus => ORDER_FALLBACK.to_string(),
            IntentKind::ProductSearch => PRODUCT_FALLBACK.to_string(),
            IntentKind::PolicyQuestion => POLICY_FALLBACK.to_string(),
            other => self.direct(other, text),
        }
    }

    fn generic(&self, input: &str) -> String {
        self.render(pick(&GENERIC_REPLIES, input, GENERIC_DEFAULT))
    }

    fn render(&self, template: &str) -> String {
        template.replace("{name}", &self.assistant_name)
    }
}

fn complaint_reply(input: &str) -> &'static str {
    let about_refund = mentions(input, &["return", "refund"]);
    if about_refund && mentions(input, &["not"]) && !mentions(input, &["late", "delayed", "waiting"])
    {
        return REFUND_NOT_PROCESSED;
    }
    pick(&COMPLAINT_REPLIES, input, COMPLAINT_DEFAULT)
}

fn pick(replies: &[KeywordReply], input: &str, default: &'static str) -> &'static str {
    replies
        .iter()
        .find(|(keywords, _)| mentions(input, keywords))
        .map(|(_, reply)| *reply)
        .unwrap_or(default)
}

/// Phrases match as substrings; single words must match a whole word or its plural.
fn mentions(input: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| {
        if keyword.contains(' ') {
            input.contains(keyword)
        } else {
            input
                .split(|character: char| !character.is_alphanumeric() && character != '\'')
                .any(|word| word == *keyword || word.strip_suffix('s') == Some(*keyword))
        }
    })
}
