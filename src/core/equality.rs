// ============================================================================
// delta-sets - Equality Functions
// Structural comparators backing the cell's no-op gate
// ============================================================================

/// Equality function type used by the cell gate.
pub type EqualsFn<T> = fn(&T, &T) -> bool;

// =============================================================================
// STRUCTURAL EQUALITY (Default)
// =============================================================================

/// Deep structural equality.
///
/// `#[derive(PartialEq)]` already performs recursive structural comparison,
/// so this is `==` on the value — not identity. A cell write whose next value
/// deep-equals the current one is suppressed entirely.
///
/// # Example
/// ```
/// use delta_sets::core::equality::deep_equals;
///
/// assert!(deep_equals(&vec![1, 2], &vec![1, 2]));
/// assert!(!deep_equals(&vec![1, 2], &vec![1, 3]));
/// ```
pub fn deep_equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

// =============================================================================
// GATE OVERRIDES
// =============================================================================

/// Never equal - every write commits and emits, even when the value is
/// unchanged.
pub fn never_equals<T>(_a: &T, _b: &T) -> bool {
    false
}

/// Always equal - writes never commit. Useful for pinning a cell.
pub fn always_equals<T>(_a: &T, _b: &T) -> bool {
    true
}

/// Compare two values through a projection of one field.
///
/// # Example
/// ```
/// use delta_sets::core::equality::by_field;
///
/// #[derive(Clone)]
/// struct User { id: u32, name: String }
///
/// let eq = by_field(|u: &User| u.id);
/// let a = User { id: 1, name: "Ada".into() };
/// let b = User { id: 1, name: "Grace".into() };
/// assert!(eq(&a, &b));
/// ```
pub fn by_field<T, F, R>(field_fn: F) -> impl Fn(&T, &T) -> bool
where
    F: Fn(&T) -> R,
    R: PartialEq,
{
    move |a, b| field_fn(a) == field_fn(b)
}

// =============================================================================
// TESTS
// =============================================================================
