//! Prompt construction for classification and cascade calls.

use pharmakg_common::{Classification, Drug, EffectEntity};
use pharmakg_llm::LlmRequest;

pub const CLASSIFICATION_SYSTEM_PROMPT: &str = "\
You are a pharmacology expert annotating a drug-target knowledge graph. \
Classify the relationship between the given drug and target. \
Answer with a single JSON object and nothing else, using exactly these keys:
{
  \"relationship_type\": one of \"Primary/On-Target\", \"Secondary/Off-Target\", \"Metabolic\", \"Transport\", \"Unknown\",
  \"target_class\": protein family, e.g. \"Enzyme\", \"GPCR\", \"Ion Channel\", \"Kinase\", \"Transporter\", \"Nuclear Receptor\",
  \"target_subclass\": more specific family, e.g. \"Cyclooxygenase\",
  \"mechanism\": e.g. \"Inhibitor\", \"Agonist\", \"Antagonist\", \"Substrate\", \"Modulator\",
  \"confidence\": number between 0 and 1,
  \"reasoning\": one or two sentences of evidence
}";

pub const CASCADE_SYSTEM_PROMPT: &str = "\
You are a systems pharmacology expert predicting downstream biological effects. \
Answer with a single JSON object and nothing else:
{
  \"effects\": [
    {
      \"entity_name\": name of the affected pathway, gene, protein, metabolite, cell process or phenotype,
      \"entity_type\": one of \"Pathway\", \"Gene\", \"Protein\", \"Metabolite\", \"CellularProcess\", \"Phenotype\",
      \"effect_type\": e.g. \"decreases\", \"increases\", \"inhibits\", \"activates\", \"modulates\",
      \"confidence\": number between 0 and 1,
      \"reasoning\": one sentence
    }
  ]
}
Return an empty list when no well-supported effect exists.";

fn describe_drug(drug: &Drug) -> String {
    let mut parts = vec![format!("Drug: {}", drug.name)];
    if let Some(moa) = &drug.mechanism_of_action {
        parts.push(format!("Known mechanism of action: {moa}"));
    }
    if let Some(phase) = &drug.development_phase {
        parts.push(format!("Development phase: {phase}"));
    }
    if let Some(smiles) = &drug.smiles {
        parts.push(format!("SMILES: {smiles}"));
    }
    parts.join("\n")
}

fn push_context(prompt: &mut String, context: Option<&str>) {
    if let Some(ctx) = context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\nAdditional context: ");
        prompt.push_str(ctx);
    }
}

/// Single-pair classification prompt.
pub fn classification_request(drug: &Drug, target: &str, context: Option<&str>) -> LlmRequest {
    let mut user = format!("{}\nTarget: {target}", describe_drug(drug));
    push_context(&mut user, context);
    user.push_str("\n\nClassify this drug-target relationship.");
    LlmRequest::new(CLASSIFICATION_SYSTEM_PROMPT, user)
}

/// Level-1 cascade prompt: direct effects of the drug acting on the target.
pub fn direct_effects_request(
    drug: &Drug,
    target: &str,
    classification: Option<&Classification>,
    context: Option<&str>,
    max_effects: usize,
) -> LlmRequest {
    let mut user = format!("{}\nTarget: {target}", describe_drug(drug));
    if let Some(c) = classification {
        user.push_str(&format!(
            "\nKnown interaction: {} ({}), {} / {}",
            c.relationship_type, c.mechanism, c.target_class, c.target_subclass
        ));
    }
    push_context(&mut user, context);
    user.push_str(&format!(
        "\n\nList at most {max_effects} entities DIRECTLY affected when {} acts on {target}.",
        drug.name
    ));
    LlmRequest::new(CASCADE_SYSTEM_PROMPT, user)
}

/// Deeper cascade prompt anchored at an entity found one level up.
pub fn downstream_effects_request(
    drug: &Drug,
    target: &str,
    anchor: &EffectEntity,
    depth: u8,
    context: Option<&str>,
    max_effects: usize,
) -> LlmRequest {
    let mut user = format!(
        "{}\nTarget: {target}\nAnchor: {} ({}), reached at cascade depth {}",
        describe_drug(drug),
        anchor.name,
        anchor.entity_type,
        depth - 1
    );
    push_context(&mut user, context);
    user.push_str(&format!(
        "\n\nGiven that {} acting on {target} affects {}, list at most {max_effects} entities \
         affected downstream of {} as a consequence.",
        drug.name, anchor.name, anchor.name
    ));
    LlmRequest::new(CASCADE_SYSTEM_PROMPT, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_prompt_mentions_pair_and_context() {
        let mut drug = Drug::new("aspirin");
        drug.mechanism_of_action = Some("COX inhibitor".to_string());
        let req = classification_request(&drug, "PTGS1", Some("antiplatelet use"));
        let text = req.user_text();
        assert!(text.contains("Drug: aspirin"));
        assert!(text.contains("Target: PTGS1"));
        assert!(text.contains("COX inhibitor"));
        assert!(text.contains("antiplatelet use"));
        assert_eq!(req.messages[0].role, "system");
    }

    #[test]
    fn test_blank_context_is_omitted() {
        let req = classification_request(&Drug::new("aspirin"), "PTGS1", Some("   "));
        assert!(!req.user_text().contains("Additional context"));
    }

    #[test]
    fn test_anchor_prompt_names_anchor() {
        let anchor = EffectEntity::new("Thromboxane A2", "Metabolite");
        let req = downstream_effects_request(&Drug::new("aspirin"), "PTGS1", &anchor, 2, None, 5);
        let text = req.user_text();
        assert!(text.contains("Anchor: Thromboxane A2 (Metabolite)"));
        assert!(text.contains("downstream of Thromboxane A2"));
    }
}
