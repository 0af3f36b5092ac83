/// Evaluator states. The current one lives in the `op` register and every
/// saved frame on the dump records the one to resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eval,
    /// Operator evaluated; decide between macro expansion and application.
    E0Args,
    /// One operand evaluated.
    E1Args,
    Apply,
    DoMacro,

    Quote,
    Lambda,
    Define0,
    Define1,
    DefineMacro,
    Set0,
    Set1,
    If0,
    If1,
    Begin,
    Cond0,
    Cond1,
    Case0,
    Case1,
    And0,
    And1,
    Or0,
    Or1,
    Let0,
    Let1,
    Let2,
    LetStar0,
    LetStar1,
    LetRec0,
    LetRec1,
    LetRec2,
    Do,
    Quasiquote,
    Delay,
    ConsStream0,
    ConsStream1,

    CallCC,
    ContinuationReturn,
    DynamicWind,
    Wind1,
    Wind2,
    Wind3,
    WindInvoke,
    WindSet,
    ApplyProc,
    EvalProc,
    Force,
    SaveForced,
    Load,
    LoadRead,
    ErrorHookDone,
}

impl Op {
    /// Keywords recognised in operator position, with their entry state.
    pub const SPECIAL_FORMS: &'static [(&'static str, Op)] = &[
        ("quote", Op::Quote),
        ("lambda", Op::Lambda),
        ("define", Op::Define0),
        ("define-macro", Op::DefineMacro),
        ("set!", Op::Set0),
        ("if", Op::If0),
        ("begin", Op::Begin),
        ("cond", Op::Cond0),
        ("case", Op::Case0),
        ("and", Op::And0),
        ("or", Op::Or0),
        ("let", Op::Let0),
        ("let*", Op::LetStar0),
        ("letrec", Op::LetRec0),
        ("letrec*", Op::LetRec0),
        ("do", Op::Do),
        ("quasiquote", Op::Quasiquote),
        ("delay", Op::Delay),
        ("cons-stream", Op::ConsStream0),
    ];
}
