// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Post-construction Modifiers
//!
//! Declarations accept an optional modifier that is applied to the freshly built
//! entity before it reaches the broker. An absent modifier leaves the entity as is.

/// A transformation applied once to an entity after construction.
pub type Modifier<T> = Box<dyn FnOnce(T) -> T + Send>;

/// Applies `modifier` to `element` when present, otherwise returns `element` untouched.
pub fn modify<T>(element: T, modifier: Option<Modifier<T>>) -> T {
    match modifier {
        Some(modifier) => modifier(element),
        None => element,
    }
}

/// Combines two modifiers into one that runs `first` and then `second`.
pub fn chain<T: 'static>(first: Modifier<T>, second: Modifier<T>) -> Modifier<T> {
    Box::new(move |element| second(first(element)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_modifier_is_a_no_op() {
        assert_eq!(modify(41, None), 41);
    }

    #[test]
    fn present_modifier_is_applied_once() {
        let add_one: Modifier<i32> = Box::new(|v| v + 1);
        assert_eq!(modify(41, Some(add_one)), 42);
    }

    #[test]
    fn chained_modifiers_run_in_order() {
        let push_a: Modifier<String> = Box::new(|mut s| {
            s.push('a');
            s
        });
        let push_b: Modifier<String> = Box::new(|mut s| {
            s.push('b');
            s
        });

        assert_eq!(modify(String::new(), Some(chain(push_a, push_b))), "ab");
    }
}
