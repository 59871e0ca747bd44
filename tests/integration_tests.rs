// Integration tests for the x64_c compiler
// These tests run the full pipeline over whole programs and verify the
// structure of the generated assembly text. Assembling, linking, and
// running the output is the external toolchain's job, so the assertions
// here pin down the contract that step relies on: labels, section
// directives, calling convention, and control-flow shape.

use x64_c::compile;

/// Compile a C program and return its assembly, panicking with the
/// compiler's message on failure.
fn assemble(source: &str) -> String {
    compile(source).unwrap_or_else(|e| panic!("compilation failed: {e}"))
}

/// Count non-overlapping occurrences of `needle`.
fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

// The bubble-sort-and-search program exercised end to end: sorts five
// numbers, prints them with int_to_string + puts, then binary-searches.
const SORT_AND_SEARCH: &str = r#"
int puts(const char *);

void int_to_string(int n, char *buffer) {
    int i;
    int j;
    int digit;
    char temp;
    int is_negative;

    i = 0;
    is_negative = 0;

    if (n < 0) {
        is_negative = 1;
        n = 0 - n;
    }

    if (n == 0) {
        buffer[0] = 48;
        buffer[1] = 0;
        return;
    }

    while (n > 0) {
        digit = n % 10;
        buffer[i] = digit + 48;
        i = i + 1;
        n = n / 10;
    }

    if (is_negative) {
        buffer[i] = 45;
        i = i + 1;
    }

    buffer[i] = 0;

    j = 0;
    i = i - 1;
    while (j < i) {
        temp = buffer[j];
        buffer[j] = buffer[i];
        buffer[i] = temp;
        j = j + 1;
        i = i - 1;
    }
}

void sort(int arr[], int n) {
    int i;
    int j;
    int temp;

    for (i = 0; i < n - 1; i = i + 1) {
        for (j = 0; j < n - 1 - i; j = j + 1) {
            if (arr[j] > arr[j + 1]) {
                temp = arr[j];
                arr[j] = arr[j + 1];
                arr[j + 1] = temp;
            }
        }
    }
}

int binary_search(int arr[], int n, int target) {
    int left;
    int right;
    int mid;

    left = 0;
    right = n - 1;

    while (left <= right) {
        mid = (left + right) / 2;

        if (arr[mid] == target) {
            return mid;
        } else if (arr[mid] < target) {
            left = mid + 1;
        } else {
            right = mid - 1;
        }
    }

    return -1;
}

int main() {
    int arr[5];
    char buffer[20];
    int i;
    int index;

    arr[0] = 5;
    arr[1] = 2;
    arr[2] = 9;
    arr[3] = 1;
    arr[4] = 3;

    sort(arr, 5);

    puts("sorted numbers");
    for (i = 0; i < 5; i = i + 1) {
        int_to_string(arr[i], buffer);
        puts(buffer);
    }
    puts("");

    puts("search result");
    index = binary_search(arr, 5, 3);
    int_to_string(index, buffer);
    puts(buffer);

    return 0;
}
"#;

// ============================================================
// End-to-end scenarios
// ============================================================

#[test]
fn test_minimal_program() {
    let asm = assemble("int main(){return 0;}");
    assert!(asm.starts_with(".section .note.GNU-stack,\"\",@progbits\n"));
    assert!(asm.contains(".section .text"));
    assert!(asm.contains(".globl main"));
    assert!(asm.contains("main:"));
    assert!(asm.contains("movl $0, %eax"));
    assert!(asm.contains("leave"));
    assert!(asm.contains("ret"));
}

#[test]
fn test_sort_and_search_program() {
    let asm = assemble(SORT_AND_SEARCH);

    // Exactly one label per defined function, none for the puts prototype
    assert_eq!(count(&asm, "\nint_to_string:"), 1);
    assert_eq!(count(&asm, "\nsort:"), 1);
    assert_eq!(count(&asm, "\nbinary_search:"), 1);
    assert_eq!(count(&asm, "\nmain:"), 1);
    assert!(!asm.contains("\nputs:"), "prototypes must not emit labels");

    // One `call` per Call node in the source
    assert_eq!(count(&asm, "call puts"), 5);
    assert_eq!(count(&asm, "call int_to_string"), 2);
    assert_eq!(count(&asm, "call sort"), 1);
    assert_eq!(count(&asm, "call binary_search"), 1);

    // The three literals are pooled into .rodata
    assert!(asm.contains(".section .rodata"));
    assert!(asm.contains(".string \"sorted numbers\""));
    assert!(asm.contains(".string \"search result\""));
    assert!(asm.contains(".string \"\""));
}

#[test]
fn test_if_else_returns() {
    let asm = assemble("int main(){int x; x = 7; if (x > 5) return 1; else return 2;}");
    assert!(asm.contains("setg %al"), "asm: {asm}");
    assert!(asm.contains("je .Lelse"), "asm: {asm}");
    assert!(asm.contains("movl $1, %eax"), "asm: {asm}");
    assert!(asm.contains("movl $2, %eax"), "asm: {asm}");
}

#[test]
fn test_for_loop_sum() {
    let asm =
        assemble("int main(){int i; int s; s = 0; for (i=1; i<=10; i=i+1) s = s + i; return s;}");
    assert!(asm.contains(".Lfor"), "asm: {asm}");
    assert!(asm.contains("jmp .Lfor"), "asm: {asm}");
    assert!(asm.contains("setle %al"), "asm: {asm}");
    assert!(asm.contains("addl %ecx, %eax"), "asm: {asm}");
}

#[test]
fn test_array_and_pointer_roundtrip() {
    let asm = assemble(
        "int main(){int a[3]; a[0]=1; a[1]=2; a[2]=3; int *p; p = &a[1]; return *p;}",
    );
    // a sits at -16 (12 bytes padded to a 16 boundary), p below it at -24
    assert!(asm.contains("leaq -16(%rbp), %rax"), "asm: {asm}");
    assert!(asm.contains("shlq $2, %rax"), "asm: {asm}");
    assert!(asm.contains("movq %rax, -24(%rbp)"), "asm: {asm}");
    assert!(asm.contains("movq -24(%rbp), %rax"), "asm: {asm}");
    assert!(asm.contains("movl (%rax), %eax"), "asm: {asm}");
}

#[test]
fn test_short_circuit_skips_side_effect() {
    let asm = assemble(
        "int side; int f(){side=1; return 1;} int main(){side=0; if (0 && f()) return 9; return side;}",
    );
    // The left operand's zero test jumps past the call to f
    let je = asm.find("je .Lfalse").expect("short-circuit branch missing");
    let call = asm.rfind("call f").expect("call to f missing");
    assert!(je < call, "asm: {asm}");
    // side is a zero-initialized global
    assert!(asm.contains(".comm side, 4, 4"), "asm: {asm}");
    assert!(asm.contains("movl %eax, side(%rip)"), "asm: {asm}");
    assert!(asm.contains("movl side(%rip), %eax"), "asm: {asm}");
}

// ============================================================
// Boundary behaviors
// ============================================================

#[test]
fn test_empty_function_body() {
    let asm = assemble("int main(){}");
    let main_pos = asm.find("main:").unwrap();
    let tail = &asm[main_pos..];
    assert!(tail.contains("pushq %rbp"));
    assert!(tail.contains("movq %rsp, %rbp"));
    assert!(tail.contains("movl $0, %eax"));
    assert!(tail.contains("leave"));
}

#[test]
fn test_for_with_empty_clauses_loops_forever() {
    let asm = assemble("int main(){for (;;) return 1; return 0;}");
    // No condition test inside the loop, just an unconditional back edge
    assert!(asm.contains("jmp .Lfor"), "asm: {asm}");
    let loop_label = asm.find(".Lfor").unwrap();
    let back_edge = asm.rfind("jmp .Lfor").unwrap();
    assert!(loop_label < back_edge);
}

#[test]
fn test_zero_length_array_compiles() {
    assert!(compile("int main(){int a[0]; return 0;}").is_ok());
}

#[test]
fn test_parameters_spill_in_register_order() {
    let asm = assemble("int f(int a, int b, int c, int d, int e, int g){return a;} int main(){return 0;}");
    assert!(asm.contains("movq %rdi, -8(%rbp)"), "asm: {asm}");
    assert!(asm.contains("movq %rsi, -16(%rbp)"), "asm: {asm}");
    assert!(asm.contains("movq %rdx, -24(%rbp)"), "asm: {asm}");
    assert!(asm.contains("movq %rcx, -32(%rbp)"), "asm: {asm}");
    assert!(asm.contains("movq %r8, -40(%rbp)"), "asm: {asm}");
    assert!(asm.contains("movq %r9, -48(%rbp)"), "asm: {asm}");
}

// ============================================================
// Failure modes
// ============================================================

#[test]
fn test_first_error_aborts() {
    // The undefined identifier in f aborts the whole compilation even
    // though main on its own would be fine
    let err = compile("int f(){return missing;} int main(){return 0;}").unwrap_err();
    assert!(err.to_string().contains("undefined identifier 'missing'"));
}

#[test]
fn test_lex_error_carries_position() {
    let err = compile("int main() {\n  return 1 | 2;\n}").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("line 2"), "message: {message}");
}

#[test]
fn test_parse_error_carries_position() {
    let err = compile("int main() {\n  return 0\n}").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("line 3"), "message: {message}");
}

#[test]
fn test_no_output_on_error() {
    assert!(compile("int main() { return").is_err());
}
