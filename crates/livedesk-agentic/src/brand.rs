// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-project greeting replies.

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use livedesk_config::model::BrandConfig;

/// Renders greeting replies from the configured brand of each project.
#[derive(Debug, Clone, Default)]
pub struct BrandGreeter {
    brands: BTreeMap<String, BrandConfig>,
}

impl BrandGreeter {
    pub fn new(brands: BTreeMap<String, BrandConfig>) -> Self {
        Self { brands }
    }

    /// Greeting for `project_id` at `at`. The template is a pure function of
    /// the brand text, so a project always greets the same way.
    pub fn greeting(&self, project_id: &str, at: DateTime<Utc>) -> String {
        let tod = time_of_day(at);
        let Some(brand) = self.brands.get(project_id) else {
            return format!("{tod}! Thanks for reaching out. How can we help you today?");
        };

        let company = non_empty(&brand.company_name);
        let about = non_empty(&brand.about);
        match (company, about) {
            (Some(company), Some(about)) => {
                let templates = [
                    format!("{tod}! Welcome to {company}. {about} How can we help you today?"),
                    format!(
                        "Hello! Thanks for reaching out to {company}. {about} - What can we assist you with?"
                    ),
                    format!("Hi there! You've reached {company} support. {about} How may we help you?"),
                ];
                pick(templates, company)
            }
            (Some(company), None) => {
                let templates = [
                    format!("{tod}! Welcome to {company}. How can we assist you today?"),
                    format!("Hello! You've reached {company} support. What can we help you with?"),
                    format!("Hi there! Thanks for contacting {company}. How may we help you?"),
                ];
                pick(templates, company)
            }
            (None, Some(about)) => {
                let templates = [
                    format!("{tod}! {about} How can we help you today?"),
                    format!("Hello! {about} What can we assist you with?"),
                    format!("Hi there! {about} How may we help you?"),
                ];
                pick(templates, about)
            }
            (None, None) => format!("{tod}! Welcome to our support. How can we help you today?"),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn pick(templates: [String; 3], key: &str) -> String {
    let index = key.chars().count() % templates.len();
    templates.into_iter().nth(index).unwrap_or_default()
}

fn time_of_day(at: DateTime<Utc>) -> &'static str {
    match at.hour() {
        5..=11 => "Good morning",
        12..=16 => "Good afternoon",
        17..=21 => "Good evening",
        _ => "Hello",
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 15, 0).unwrap()
    }

    fn greeter() -> BrandGreeter {
        let mut brands = BTreeMap::new();
        brands.insert(
            "full".to_string(),
            BrandConfig {
                company_name: Some("Acme".into()),
                about: Some("We make anvils.".into()),
                support_url: None,
            },
        );
        brands.insert(
            "name".to_string(),
            BrandConfig {
                company_name: Some("Globex".into()),
                ..BrandConfig::default()
            },
        );
        brands.insert(
            "about".to_string(),
            BrandConfig {
                about: Some("  Tools for teams. ".into()),
                company_name: Some("   ".into()),
                support_url: None,
            },
        );
        brands.insert("blank".to_string(), BrandConfig::default());
        BrandGreeter::new(brands)
    }

    #[test]
    fn time_of_day_boundaries() {
        assert_eq!(time_of_day(at(4)), "Hello");
        assert_eq!(time_of_day(at(5)), "Good morning");
        assert_eq!(time_of_day(at(12)), "Good afternoon");
        assert_eq!(time_of_day(at(17)), "Good evening");
        assert_eq!(time_of_day(at(22)), "Hello");
    }

    #[test]
    fn full_brand_template_keyed_by_company_length() {
        // "Acme" has 4 chars, 4 % 3 == 1.
        assert_eq!(
            greeter().greeting("full", at(9)),
            "Hello! Thanks for reaching out to Acme. We make anvils. - What can we assist you with?"
        );
    }

    #[test]
    fn company_only_template() {
        // "Globex" has 6 chars, 6 % 3 == 0.
        assert_eq!(
            greeter().greeting("name", at(14)),
            "Good afternoon! Welcome to Globex. How can we assist you today?"
        );
    }

    #[test]
    fn blank_company_falls_back_to_about() {
        // "Tools for teams." has 16 chars, 16 % 3 == 1.
        assert_eq!(
            greeter().greeting("about", at(9)),
            "Hello! Tools for teams. What can we assist you with?"
        );
    }

    #[test]
    fn generic_and_unknown_projects() {
        assert_eq!(
            greeter().greeting("blank", at(19)),
            "Good evening! Welcome to our support. How can we help you today?"
        );
        assert_eq!(
            greeter().greeting("missing", at(8)),
            "Good morning! Thanks for reaching out. How can we help you today?"
        );
    }

    #[test]
    fn greeting_is_stable() {
        let g = greeter();
        assert_eq!(g.greeting("full", at(10)), g.greeting("full", at(10)));
    }
}
