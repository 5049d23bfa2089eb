use crate::types::Score;

pub struct CandidateSummary<'a> {
    pub move_uci: &'a str,
    pub move_san: &'a str,
    pub root_eval: Score,
}

pub struct PositionContext<'a> {
    pub label: &'a str,
    pub fen: &'a str,
    pub side_to_move: &'a str,
    pub eval: Score,
    pub move_san: &'a str,
    pub context_san: &'a [String],
}

pub struct StepSummary<'a> {
    pub label: &'a str,
    pub move_san: &'a str,
    pub summary: &'a str,
}

pub struct OtherLine<'a> {
    pub label: &'a str,
    pub move_san: &'a str,
    pub overall: &'a str,
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "(none)"
    } else {
        text.trim()
    }
}

pub fn engine_choice(fen: &str, side_to_move: &str, candidates: &[CandidateSummary<'_>]) -> String {
    let lines: Vec<String> = candidates
        .iter()
        .map(|c| format!("- {} ({})  root_eval={}", c.move_san, c.move_uci, c.root_eval))
        .collect();
    format!(
        "You are a strong chess analyst.\n\
         \n\
         Return ONLY JSON.\n\
         \n\
         Starting position\n\
         Side to move: {side_to_move}\n\
         FEN: {fen}\n\
         \n\
         Candidates:\n\
         {}\n\
         \n\
         Pick the single engine-best move and give a one sentence reason.\n\
         \n\
         Output schema:\n\
         {{\"engine_move_uci\": \"e2e4\", \"engine_move_san\": \"e4\", \"short_reason\": \"one sentence\"}}\n",
        lines.join("\n")
    )
}

pub fn position_summary(ctx: &PositionContext<'_>) -> String {
    let moves = ctx.context_san.join(" ");
    format!(
        "You are a strong chess coach.\n\
         \n\
         Write a short position summary of 3 to 5 sentences: key threats and plans, \
         tactical issues, and what the evaluation means in human terms.\n\
         \n\
         Position label: {}\n\
         Moves leading here (SAN): {}\n\
         Move that led here (SAN): {}\n\
         Side to move: {}\n\
         Engine eval (White POV): {}\n\
         FEN: {}\n",
        ctx.label,
        or_none(&moves),
        if ctx.move_san.is_empty() { "(start of line)" } else { ctx.move_san },
        ctx.side_to_move,
        ctx.eval,
        ctx.fen,
    )
}

pub fn line_overall(
    fen: &str,
    side_to_move: &str,
    move_san: &str,
    root_eval: Score,
    pv_san: &[String],
    steps: &[StepSummary<'_>],
) -> String {
    let blocks: Vec<String> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "STEP {}\nLabel: {}\nMove (SAN): {}\nSummary:\n{}\n",
                i + 1,
                s.label,
                s.move_san,
                or_none(s.summary)
            )
        })
        .collect();
    format!(
        "You are a chess analyst. Be concise and concrete.\n\
         \n\
         Starting position\n\
         Side to move: {side_to_move}\n\
         FEN: {fen}\n\
         \n\
         Candidate first move (SAN): {move_san}\n\
         Root engine eval (White POV): {root_eval}\n\
         PV (SAN): {}\n\
         \n\
         {}\n\
         Summarise the overall result of this line in 6 to 9 sentences. Focus on \
         consequences and tradeoffs; do not rehash every ply.\n",
        or_none(&pv_san.join(" ")),
        blocks.join("\n")
    )
}

pub fn line_compare(label: &str, move_san: &str, overall: &str, others: &[OtherLine<'_>]) -> String {
    let blocks: Vec<String> = others
        .iter()
        .map(|o| format!("- {} / {}\n{}\n", o.label, o.move_san, or_none(o.overall)))
        .collect();
    format!(
        "You are a chess analyst.\n\
         \n\
         Target line\n\
         Label: {label}\n\
         Starting move: {move_san}\n\
         Summary:\n\
         {}\n\
         \n\
         Other lines:\n\
         {}\n\
         \n\
         Explain in at most 10 bullets what turned out differently for the target line.\n",
        or_none(overall),
        or_none(&blocks.join("\n"))
    )
}
