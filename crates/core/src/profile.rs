//! Immutable domain tables shared by the section parser and the metadata
//! builder. A profile is built once and handed to components explicitly.

use crate::models::{Difficulty, SectionKind};
use std::collections::BTreeMap;

/// Keyword set identifying one side of the migration.
#[derive(Debug, Clone)]
pub struct LanguageKeywords {
    pub name: String,
    pub keywords: Vec<String>,
}

/// A classification rule matches when any of its triggers matches; a trigger
/// matches when every keyword in it is a substring of the lower-cased title.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub triggers: Vec<Vec<String>>,
    pub kind: SectionKind,
}

impl ClassificationRule {
    pub fn new(triggers: &[&[&str]], kind: SectionKind) -> Self {
        Self {
            triggers: triggers
                .iter()
                .map(|trigger| trigger.iter().map(|word| word.to_string()).collect())
                .collect(),
            kind,
        }
    }

    pub fn matches(&self, lowered_title: &str) -> bool {
        self.triggers.iter().any(|trigger| {
            trigger
                .iter()
                .all(|keyword| lowered_title.contains(keyword.as_str()))
        })
    }
}

#[derive(Debug, Clone)]
pub struct PatternRule {
    pub label: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideMetadata {
    pub difficulty: Difficulty,
    pub concepts: Vec<String>,
}

/// Description and migration notes rendered into a paired example document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractNotes {
    pub contract_type: String,
    pub description: String,
    pub differences: Vec<String>,
    pub steps: Vec<String>,
    /// `(before, after)` snippets shown side by side.
    pub snippets: Vec<(String, String)>,
}

impl ContractNotes {
    /// Markdown `## Migration Notes` block.
    pub fn render(&self, before_label: &str, after_label: &str) -> String {
        let numbered = |items: &[String]| {
            items
                .iter()
                .enumerate()
                .map(|(index, item)| format!("{}. {item}\n", index + 1))
                .collect::<String>()
        };

        let mut out = format!(
            "## Migration Notes: {before_label} {name} to {after_label} {name}\n\n",
            name = self.contract_type
        );
        out.push_str(&format!("### Key Differences\n{}\n", numbered(&self.differences)));
        out.push_str(&format!("### Migration Steps\n{}", numbered(&self.steps)));
        if !self.snippets.is_empty() {
            out.push_str("\n### Common Patterns\n");
            for (before, after) in &self.snippets {
                out.push_str(&format!("- {before_label}: `{before}`\n- {after_label}: `{after}`\n\n"));
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct DomainProfile {
    pub before: LanguageKeywords,
    pub after: LanguageKeywords,
    /// Evaluated in order; the first matching rule decides.
    pub classification_rules: Vec<ClassificationRule>,
    pub patterns: Vec<PatternRule>,
    pub guides: BTreeMap<String, GuideMetadata>,
    pub fallback: GuideMetadata,
    /// Guide name given to the tutorial document that is not a per-contract guide.
    pub tutorial_name: String,
    /// Paired example notes keyed by contract directory name.
    pub contracts: BTreeMap<String, ContractNotes>,
    /// Differences, steps and snippets used for contracts without their own.
    pub general_notes: ContractNotes,
}

impl DomainProfile {
    /// Tables for migrating Solidity contracts to ink! smart contracts.
    pub fn solidity_to_ink() -> Self {
        let words = |items: &[&str]| items.iter().map(|item| item.to_string()).collect::<Vec<_>>();

        let guides = [
            ("counter", Difficulty::Beginner, &["state", "functions", "basics"][..]),
            ("flipper", Difficulty::Beginner, &["state", "boolean", "toggle", "events"][..]),
            ("simple_storage", Difficulty::Intermediate, &["mappings", "arrays", "storage"][..]),
            ("event_emitter", Difficulty::Intermediate, &["events", "topics", "indexing"][..]),
            ("erc721_nft", Difficulty::Advanced, &["nft", "tokens", "standards", "metadata"][..]),
            ("multisig_wallet", Difficulty::Advanced, &["multisig", "security", "approvals"][..]),
            (
                "erc20",
                Difficulty::Intermediate,
                &["tokens", "standards", "transfers", "allowances"][..],
            ),
            (
                "erc1155",
                Difficulty::Advanced,
                &["multi-token", "batch", "fungible", "non-fungible"][..],
            ),
            (
                "escrow_vesting",
                Difficulty::Advanced,
                &["escrow", "vesting", "time-locks", "payments"][..],
            ),
        ]
        .into_iter()
        .map(|(name, difficulty, concepts)| {
            (
                name.to_string(),
                GuideMetadata {
                    difficulty,
                    concepts: words(concepts),
                },
            )
        })
        .collect();

        let patterns = [
            ("storage_conversion", &["mapping", "storage", "struct"][..]),
            ("event_handling", &["event", "emit", "topic"][..]),
            ("error_handling", &["error", "result", "require"][..]),
            ("access_control", &["modifier", "only", "authorized"][..]),
            ("state_machine", &["enum", "state", "transition"][..]),
            ("token_standard", &["erc", "token", "transfer"][..]),
            ("batch_operations", &["batch", "array", "loop"][..]),
            ("time_based", &["timestamp", "deadline", "duration"][..]),
            ("multi_party", &["multisig", "approval", "consensus"][..]),
            ("fee_calculation", &["fee", "percentage", "basis"][..]),
            ("withdrawal_pattern", &["withdraw", "pending", "balance"][..]),
            ("approval_pattern", &["approve", "allowance", "operator"][..]),
        ]
        .into_iter()
        .map(|(label, keywords)| PatternRule {
            label: label.to_string(),
            keywords: words(keywords),
        })
        .collect();

        let snippets = |items: &[(&str, &str)]| {
            items
                .iter()
                .map(|(before, after)| (before.to_string(), after.to_string()))
                .collect::<Vec<_>>()
        };
        let general_notes = ContractNotes {
            contract_type: String::new(),
            description: String::new(),
            differences: words(&[
                "Storage: Solidity state variables move into one `#[ink(storage)]` struct",
                "Functions: public functions need `#[ink(message)]` and the constructor needs `#[ink(constructor)]`",
                "Error handling: `require()` becomes an explicit `Result<T, Error>` return",
                "Events: events are declared with `#[ink(event)]` and indexed fields need `#[ink(topic)]`",
                "Access control: `msg.sender` becomes `self.env().caller()`",
            ]),
            steps: words(&[
                "Collect state variables into the storage struct",
                "Annotate the constructor and every public function",
                "Define an error enum and return `Result` from fallible messages",
                "Emit events with `self.env().emit_event()`",
            ]),
            snippets: snippets(&[
                ("require(condition, \"error message\");", "if !condition { return Err(Error::Custom) }"),
                ("msg.sender", "self.env().caller()"),
                ("emit Transfer(from, to, value);", "self.env().emit_event(Transfer { from, to, value });"),
            ]),
        };
        let specific = |contract_type: &str,
                        description: &str,
                        differences: &[&str],
                        steps: &[&str],
                        pairs: &[(&str, &str)]| ContractNotes {
            contract_type: contract_type.to_string(),
            description: description.to_string(),
            differences: words(differences),
            steps: words(steps),
            snippets: snippets(pairs),
        };
        let described = |contract_type: &str, description: &str| ContractNotes {
            contract_type: contract_type.to_string(),
            description: description.to_string(),
            ..general_notes.clone()
        };

        let contracts = [
            (
                "erc20",
                specific(
                    "ERC20",
                    "ERC20 fungible token implementation with basic transfer, approve, and allowance functionality",
                    &[
                        "Storage: `mapping(address => uint256)` becomes `Mapping<AccountId, Balance>`",
                        "Error handling: `require()` becomes `Result<T, E>` with a custom error enum",
                        "Events: indexed parameters become fields marked `#[ink(topic)]`",
                        "Modifiers: Solidity modifiers become explicit checks at the start of a message",
                        "Constructor: the Solidity constructor becomes an `#[ink(constructor)]` function",
                    ],
                    &[
                        "Replace `mapping` with `Mapping` in storage",
                        "Convert `require()` checks to early `Err` returns",
                        "Add `#[ink(storage)]`, `#[ink(constructor)]` and `#[ink(message)]` annotations",
                        "Derive the error enum with `#[ink::scale_derive(Encode, Decode, TypeInfo)]`",
                        "Use `self.env().caller()` instead of `msg.sender`",
                        "Emit events with `self.env().emit_event()`",
                    ],
                    &[
                        ("msg.sender", "self.env().caller()"),
                        ("emit Transfer(from, to, value);", "self.env().emit_event(Transfer { from, to, value });"),
                    ],
                ),
            ),
            (
                "flipper",
                specific(
                    "Flipper",
                    "Simple boolean state contract that can be flipped between true and false",
                    &[
                        "Storage: both store one boolean, but ink! wraps it in an `#[ink(storage)]` struct",
                        "State access: direct variable access becomes `self.value`",
                        "Annotations: public functions need `#[ink(message)]`",
                    ],
                    &[
                        "Wrap storage in a struct with `#[ink(storage)]`",
                        "Add `#[ink(constructor)]` and `#[ink(message)]` annotations",
                        "Read and write state through `self`",
                    ],
                    &[
                        ("bool public value;", "#[ink(storage)] pub struct Flipper { value: bool }"),
                        (
                            "function flip() public { value = !value; }",
                            "#[ink(message)] pub fn flip(&mut self) { self.value = !self.value; }",
                        ),
                    ],
                ),
            ),
            (
                "counter",
                specific(
                    "Counter",
                    "Basic counter contract with increment and decrement functionality",
                    &[
                        "Storage: `uint256` becomes `u32` or `u64`",
                        "Overflow: Solidity 0.8 reverts on overflow while ink! code uses checked or saturating arithmetic",
                    ],
                    &[
                        "Define the storage struct with `#[ink(storage)]`",
                        "Use `checked_add()` or `saturating_add()` for arithmetic",
                        "Return an error on overflow and underflow",
                        "Initialize the count in an `#[ink(constructor)]`",
                    ],
                    &[("count++;", "self.count = self.count.saturating_add(1);")],
                ),
            ),
            (
                "erc721_nft",
                specific(
                    "ERC721",
                    "ERC721 non-fungible token implementation with minting, burning, and transfer capabilities",
                    &[
                        "Token ids: `uint256` becomes a `TokenId` type alias",
                        "Storage: every mapping becomes a `Mapping<K, V>`",
                        "Approvals: the same logic with explicit error returns",
                    ],
                    &[
                        "Define a `TokenId` type alias",
                        "Convert every mapping to `Mapping<K, V>`",
                        "Return errors from failed transfers",
                        "Declare `Transfer` and `Approval` with `#[ink(event)]`",
                    ],
                    &[(
                        "mapping(uint256 => address) private _owners;",
                        "token_owner: Mapping<TokenId, AccountId>",
                    )],
                ),
            ),
            (
                "erc1155",
                described(
                    "ERC1155",
                    "Multi-token standard supporting both fungible and non-fungible tokens with batch operations",
                ),
            ),
            (
                "simple_storage",
                described(
                    "SimpleStorage",
                    "Basic storage contract demonstrating state management and data persistence",
                ),
            ),
            (
                "multisig_wallet",
                described(
                    "MultiSigWallet",
                    "Multi-signature wallet requiring multiple approvals for transactions",
                ),
            ),
            (
                "escrow_vesting",
                described("Escrow", "Escrow contract for holding funds until conditions are met"),
            ),
            (
                "event_emitter",
                described("EventEmitter", "Contract demonstrating event emission and indexing patterns"),
            ),
        ]
        .into_iter()
        .map(|(name, notes)| (name.to_string(), notes))
        .collect();

        Self {
            before: LanguageKeywords {
                name: "solidity".to_string(),
                keywords: words(&["pragma", "contract", "function", "modifier", "msg.sender", "require"]),
            },
            after: LanguageKeywords {
                name: "rust".to_string(),
                keywords: words(&["#[ink", "impl", "pub fn", "Result<", "AccountId", "Balance"]),
            },
            classification_rules: vec![
                ClassificationRule::new(&[&["overview"]], SectionKind::Overview),
                ClassificationRule::new(&[&["solidity"]], SectionKind::BeforeLanguage),
                ClassificationRule::new(&[&["ink"]], SectionKind::AfterLanguage),
                ClassificationRule::new(&[&["migration"], &["steps"]], SectionKind::MigrationStep),
                ClassificationRule::new(&[&["pattern"], &["example"]], SectionKind::Pattern),
                ClassificationRule::new(&[&["key", "point"]], SectionKind::Comparison),
                ClassificationRule::new(&[&["best", "practice"]], SectionKind::BestPractices),
            ],
            patterns,
            guides,
            fallback: GuideMetadata {
                difficulty: Difficulty::Intermediate,
                concepts: words(&["general"]),
            },
            tutorial_name: "main_tutorial".to_string(),
            contracts,
            general_notes,
        }
    }

    /// Notes for the contract pair `name`. Unknown contracts get the general
    /// notes and a generated description.
    pub fn contract_notes(&self, name: &str) -> ContractNotes {
        self.contracts.get(name).cloned().unwrap_or_else(|| ContractNotes {
            contract_type: name.to_string(),
            description: format!("Smart contract implementation: {name}"),
            ..self.general_notes.clone()
        })
    }

    /// Every guide a complete training corpus is expected to cover.
    pub fn required_guides(&self) -> Vec<String> {
        let mut names: Vec<String> = self.guides.keys().cloned().collect();
        names.push(self.tutorial_name.clone());
        names
    }
}

impl Default for DomainProfile {
    fn default() -> Self {
        Self::solidity_to_ink()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_requires_all_keywords_of_a_trigger() {
        let rule = ClassificationRule::new(&[&["key", "point"]], SectionKind::Comparison);
        assert!(rule.matches("key points to remember"));
        assert!(!rule.matches("key differences"));
    }

    #[test]
    fn required_guides_include_tutorial() {
        let profile = DomainProfile::solidity_to_ink();
        let required = profile.required_guides();
        assert_eq!(required.len(), 10);
        assert!(required.iter().any(|name| name == "main_tutorial"));
    }

    #[test]
    fn unknown_contracts_get_general_notes() {
        let profile = DomainProfile::solidity_to_ink();
        let known = profile.contract_notes("flipper");
        assert_eq!(known.contract_type, "Flipper");
        assert_eq!(known.differences.len(), 3);

        let unknown = profile.contract_notes("vault");
        assert_eq!(unknown.contract_type, "vault");
        assert_eq!(unknown.description, "Smart contract implementation: vault");
        assert_eq!(unknown.steps, profile.general_notes.steps);
    }

    #[test]
    fn rendered_notes_number_every_item() {
        let notes = DomainProfile::solidity_to_ink().contract_notes("counter");
        let text = notes.render("Solidity", "ink!");
        assert!(text.starts_with("## Migration Notes: Solidity Counter to ink! Counter"));
        assert!(text.contains("### Key Differences\n1. Storage"));
        assert!(text.contains("4. Initialize the count"));
        assert!(text.contains("- ink!: `self.count = self.count.saturating_add(1);`"));
    }
}
