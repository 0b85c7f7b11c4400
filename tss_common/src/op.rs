/// Generates trait implementations for the standard arithmetic operators on transparent i64 newtypes.
///
/// ```ignore
/// op!(binary MinorUnits, Add, add);
/// op!(inplace MinorUnits, SubAssign, sub_assign);
/// op!(unary MinorUnits, Neg, neg);
/// ```
#[macro_export]
macro_rules! op {
    (binary $ty:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $ty {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0, rhs.0))
            }
        }
    };
    (inplace $ty:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $ty {
            fn $method(&mut self, rhs: Self) {
                std::ops::$trait::$method(&mut self.0, rhs.0)
            }
        }
    };
    (unary $ty:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $ty {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0))
            }
        }
    };
}
